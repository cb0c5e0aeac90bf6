//! Zarf Compose - Import-chain expansion and text templating
//!
//! A component may import another definition from a relative path or an
//! OCI reference. This crate expands those chains into flat components,
//! applies deprecation migrations, and substitutes `###ZARF_*###` tokens
//! into rendered files.

pub mod chain;
pub mod error;
pub mod migrations;
pub mod template;

pub use chain::{
    compose_package, load_definition, ComposeOutput, ImportChain, OciImportResolver,
    RejectOciImports,
};
pub use error::{ComposeError, Result};
pub use migrations::migrate_definition;
pub use template::{is_text_file, TemplateValue, Templater, TEMPLATE_PREFIX};
