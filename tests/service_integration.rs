use std::time::Duration;

use propgroups::{LinkerEvent, LinkerService, Settings, SourceConfig, Vault, VaultConfig};

fn project_settings() -> Settings {
    Settings {
        excluded_properties: vec![],
        source_pages: vec![SourceConfig::legacy(
            "project",
            "SO1",
            "Hub",
            "# Associated Pages",
        )],
    }
}

#[tokio::test]
async fn start_runs_initial_sync_and_reports_it() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;
    std::fs::write(vault_root.join("a.md"), "---\nproject: SO1\n---\n")?;

    let vault = Vault::open(&vault_root)?;
    let mut service = LinkerService::new(vault, project_settings())?;
    let mut rx = service.subscribe();

    let report = service.start().await?;
    assert_eq!(report.linked, 1);
    assert!(matches!(rx.recv().await?, LinkerEvent::FullSync { .. }));
    assert!(std::fs::read_to_string(vault_root.join("Hub.md"))?.contains("- [[a]]"));

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn watcher_links_notes_written_after_start() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;

    let cfg = VaultConfig {
        watch_debounce: Duration::from_millis(50),
        ..VaultConfig::default()
    };
    let vault = Vault::with_config(&vault_root, cfg)?;
    let mut service = LinkerService::new(vault, project_settings())?;
    let mut rx = service.subscribe();
    service.start().await?;

    std::fs::write(vault_root.join("late.md"), "---\nproject: SO1\n---\n")?;

    let linked = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(LinkerEvent::Synced { path, report, .. })
                    if path.as_str_lossy() == "late.md" && report.linked == 1 =>
                {
                    return true;
                }
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(linked, "expected a sync event for late.md");
    assert!(std::fs::read_to_string(vault_root.join("Hub.md"))?.contains("- [[late]]"));

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn update_settings_rejects_invalid_rules() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    std::fs::create_dir_all(&vault_root)?;

    let service = LinkerService::new(Vault::open(&vault_root)?, project_settings())?;
    let invalid = Settings {
        excluded_properties: vec![],
        source_pages: vec![SourceConfig::new("Hub", "# Associated Pages")],
    };
    assert!(service.update_settings(invalid).is_err());
    assert_eq!(*service.settings(), project_settings());

    let mut next = project_settings();
    next.excluded_properties.push("created".into());
    service.update_settings(next.clone())?;
    assert_eq!(*service.settings(), next);
    Ok(())
}

#[tokio::test]
async fn settings_outside_the_vault_are_reloaded_on_change() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let vault_root = temp.path().join("vault");
    let conf = temp.path().join("conf");
    std::fs::create_dir_all(&vault_root)?;
    std::fs::create_dir_all(&conf)?;
    let settings_path = conf.join("propg.toml");
    project_settings().save(&settings_path)?;

    let cfg = VaultConfig {
        watch_debounce: Duration::from_millis(50),
        ..VaultConfig::default()
    };
    let vault = Vault::with_config(&vault_root, cfg)?;
    let mut service =
        LinkerService::with_settings_path(vault, project_settings(), settings_path.clone())?;
    let mut rx = service.subscribe();
    service.start().await?;

    let mut next = project_settings();
    next.excluded_properties.push("created".into());
    next.save(&settings_path)?;

    let reloaded = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(LinkerEvent::SettingsReloaded { .. }) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(reloaded, "expected a settings reload");
    assert_eq!(*service.settings(), next);

    service.shutdown().await;
    Ok(())
}
