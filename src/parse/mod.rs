mod frontmatter;

pub use frontmatter::parse_properties;
pub(crate) use frontmatter::{BlockLine, classify_line, split_header_block};
