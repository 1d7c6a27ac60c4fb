use assert_cmd::Command;
use predicates::prelude::*;

fn propg(vault: &std::path::Path) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("propg")?;
    cmd.env_remove("OBSIDIAN_VAULT")
        .env_remove("PROPG_SETTINGS")
        .arg("--vault")
        .arg(vault);
    Ok(cmd)
}

#[test]
fn rules_add_then_sync_links_matching_notes() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;
    std::fs::write(vault_root.join("a.md"), "---\nproject: SO1\n---\n")?;
    std::fs::write(vault_root.join("b.md"), "---\nproject: SO2\n---\n")?;

    propg(&vault_root)?
        .args(["rules", "add", "--page", "Hub", "--equals", "project=SO1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added rule 1: project = SO1"));
    assert!(vault_root.join(".obsidian/propgroups/settings.toml").exists());

    propg(&vault_root)?
        .args(["rules", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. project = SO1 -> Hub # Associated Pages"));

    propg(&vault_root)?
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("linked 1, unlinked 0, failed 0"));

    let hub = std::fs::read_to_string(vault_root.join("Hub.md"))?;
    assert!(hub.contains("- [[a]]"));
    assert!(!hub.contains("[[b]]"));
    Ok(())
}

#[test]
fn rules_add_refuses_rules_without_conditions() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;

    propg(&vault_root)?
        .args(["rules", "add", "--page", "Hub"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one condition"));
    assert!(!vault_root.join(".obsidian/propgroups/settings.toml").exists());
    Ok(())
}

#[test]
fn groups_json_lists_sorted_groups() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;
    std::fs::write(vault_root.join("b.md"), "---\ntags: [x]\ncreated: 2024\n---\n")?;
    std::fs::write(vault_root.join("a.md"), "---\ntags: x\n---\n")?;

    let settings = temp.path().join("settings.json");
    std::fs::write(&settings, r#"{"excludedProperties": ["created"], "sourcePages": []}"#)?;

    let out = propg(&vault_root)?
        .arg("--settings")
        .arg(&settings)
        .args(["groups", "--json"])
        .output()?;
    assert!(out.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(
        doc,
        serde_json::json!([
            { "property": "tags", "values": [ { "value": "x", "notes": ["a.md", "b.md"] } ] }
        ])
    );
    Ok(())
}

#[test]
fn replace_dry_run_writes_nothing() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;
    std::fs::write(vault_root.join("a.md"), "---\nstatus: todo\n---\n")?;

    propg(&vault_root)?
        .args(["replace", "--property", "status", "--from", "todo", "--to", "doing", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.md").and(predicate::str::contains("1 note(s)")));
    assert_eq!(
        std::fs::read_to_string(vault_root.join("a.md"))?,
        "---\nstatus: todo\n---\n"
    );

    propg(&vault_root)?
        .args(["replace", "--property", "status", "--from", "todo", "--to", "doing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("modified 1 of 1 notes"));
    assert_eq!(
        std::fs::read_to_string(vault_root.join("a.md"))?,
        "---\nstatus: doing\n---\n"
    );
    Ok(())
}

#[test]
fn suggest_ranks_property_names() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;
    std::fs::write(vault_root.join("a.md"), "---\nproject: x\npriority: high\nstatus: y\n---\n")?;

    propg(&vault_root)?
        .args(["suggest", "property", "pri"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("priority\n"));

    propg(&vault_root)?
        .args(["suggest", "value", "h"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--property is required"));
    Ok(())
}
