//! Text templating for rendered files
//!
//! Scans files line-by-line for `###ZARF_VAR_<KEY>###`,
//! `###ZARF_CONST_<KEY>###` and registered application tokens,
//! substituting resolved values in place. A 1 MiB buffered reader
//! accommodates long lines such as base64-encoded secrets; the rewrite
//! goes through a sibling temp file and an atomic rename.

use indexmap::IndexMap;
use regex::Regex;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use zarf_core::variables::{Constant, SetVariableMap, VariableType};

use crate::error::{ComposeError, Result};

/// Token prefix for all package templates
pub const TEMPLATE_PREFIX: &str = "ZARF";

/// Reader capacity for long lines
const LINE_BUFFER_CAPACITY: usize = 1024 * 1024;

/// A resolved substitution value
#[derive(Debug, Clone, Default)]
pub struct TemplateValue {
    pub value: String,
    pub sensitive: bool,
    pub auto_indent: bool,
    /// The value names a file whose contents are substituted
    pub file_type: bool,
}

/// Template engine over variables, constants and application tokens
#[derive(Debug, Default)]
pub struct Templater {
    /// Full token -> value, e.g. `###ZARF_VAR_REGION###`
    templates: IndexMap<String, TemplateValue>,
    /// Old full token -> replacement token
    deprecated: IndexMap<String, String>,
}

impl Templater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register resolved deploy-time variables as `###ZARF_VAR_*###` tokens.
    pub fn with_variables(mut self, variables: &SetVariableMap) -> Self {
        for (name, value) in variables {
            self.templates.insert(
                format!("###{}_VAR_{}###", TEMPLATE_PREFIX, name),
                TemplateValue {
                    value: value.value.clone(),
                    sensitive: value.sensitive,
                    auto_indent: value.auto_indent,
                    file_type: value.kind == VariableType::File,
                },
            );
        }
        self
    }

    /// Register package constants as `###ZARF_CONST_*###` tokens.
    pub fn with_constants(mut self, constants: &[Constant]) -> Self {
        for constant in constants {
            self.templates.insert(
                format!("###{}_CONST_{}###", TEMPLATE_PREFIX, constant.name),
                TemplateValue {
                    value: constant.value.clone(),
                    auto_indent: constant.auto_indent,
                    ..Default::default()
                },
            );
        }
        self
    }

    /// Register an application template under its full token.
    pub fn with_application_template(mut self, token: &str, value: TemplateValue) -> Self {
        self.templates.insert(token.to_string(), value);
        self
    }

    /// Register a deprecated token that now resolves through `replacement`.
    pub fn with_deprecated(mut self, old: &str, replacement: &str) -> Self {
        self.deprecated.insert(old.to_string(), replacement.to_string());
        self
    }

    /// Substitute tokens in `path` in place.
    ///
    /// Unresolved tokens are left literally intact; the returned warnings
    /// name them (and any deprecated or unreadable-file substitutions) for
    /// lint-time surfacing.
    pub fn apply(&self, path: &Path) -> Result<Vec<String>> {
        let token_re = Regex::new(&format!(r"###{}_[A-Z0-9_]+###", TEMPLATE_PREFIX))
            .expect("static regex");
        let mut warnings = Vec::new();

        let file = std::fs::File::open(path).map_err(|e| ComposeError::Template {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let reader = BufReader::with_capacity(LINE_BUFFER_CAPACITY, file);

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

        for line in reader.lines() {
            let line = line?;
            let rendered = self.render_line(&line, &token_re, path, &mut warnings)?;
            tmp.write_all(rendered.as_bytes())?;
            tmp.write_all(b"\n")?;
        }

        tmp.flush()?;
        tmp.persist(path).map_err(|e| ComposeError::Template {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        Ok(warnings)
    }

    fn render_line(
        &self,
        line: &str,
        token_re: &Regex,
        path: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<String> {
        let mut out = String::with_capacity(line.len());
        let mut cursor = 0;

        for found in token_re.find_iter(line) {
            out.push_str(&line[cursor..found.start()]);
            cursor = found.end();

            let mut token = found.as_str();
            if let Some(replacement) = self.deprecated.get(token) {
                warnings.push(format!(
                    "{}: deprecated template {} should be {}",
                    path.display(),
                    token,
                    replacement
                ));
                token = replacement;
            }

            let Some(template) = self.templates.get(token) else {
                warnings.push(format!(
                    "{}: unknown template {} left unmodified",
                    path.display(),
                    found.as_str()
                ));
                out.push_str(found.as_str());
                continue;
            };

            let mut value = if template.file_type {
                match read_text_file(Path::new(&template.value)) {
                    Ok(contents) => contents,
                    Err(message) => {
                        warnings.push(format!(
                            "{}: template {} skipped: {}",
                            path.display(),
                            token,
                            message
                        ));
                        out.push_str(found.as_str());
                        continue;
                    }
                }
            } else {
                template.value.clone()
            };

            if template.auto_indent {
                let indent: String = line
                    .chars()
                    .take_while(|c| c.is_whitespace())
                    .collect();
                value = value.replace('\n', &format!("\n{}", indent));
            }

            out.push_str(&value);
        }

        out.push_str(&line[cursor..]);
        Ok(out)
    }
}

/// Whether a file looks like text (or JSON/XML) from its leading bytes.
///
/// File-type variables only substitute text content; binary files are
/// skipped with a warning.
pub fn is_text_file(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut head = [0u8; 512];
    let n = file.read(&mut head)?;
    let head = &head[..n];

    if head.contains(&0) {
        return Ok(false);
    }
    Ok(std::str::from_utf8(head).is_ok() || n == 0)
}

fn read_text_file(path: &Path) -> std::result::Result<String, String> {
    match is_text_file(path) {
        Ok(true) => std::fs::read_to_string(path).map_err(|e| e.to_string()),
        Ok(false) => Err(format!("{} is not a text file", path.display())),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zarf_core::variables::VariableValue;

    fn variables(entries: &[(&str, VariableValue)]) -> SetVariableMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_basic_substitution() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("deploy.yaml");
        std::fs::write(
            &file,
            "host: ###ZARF_VAR_HOST###\ntag: ###ZARF_CONST_TAG###\nmiss: ###ZARF_VAR_NOPE###\n",
        )
        .unwrap();

        let templater = Templater::new()
            .with_variables(&variables(&[(
                "HOST",
                VariableValue {
                    value: "web-01".to_string(),
                    ..Default::default()
                },
            )]))
            .with_constants(&[Constant {
                name: "TAG".to_string(),
                value: "v1.2.3".to_string(),
                ..Default::default()
            }]);

        let warnings = templater.apply(&file).unwrap();
        let rendered = std::fs::read_to_string(&file).unwrap();
        assert_eq!(rendered, "host: web-01\ntag: v1.2.3\nmiss: ###ZARF_VAR_NOPE###\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ZARF_VAR_NOPE"));
    }

    #[test]
    fn test_autoindent_multiline() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("cm.yaml");
        std::fs::write(&file, "  data: ###ZARF_VAR_BLOB###\n").unwrap();

        let templater = Templater::new().with_variables(&variables(&[(
            "BLOB",
            VariableValue {
                value: "line1\nline2".to_string(),
                auto_indent: true,
                ..Default::default()
            },
        )]));

        templater.apply(&file).unwrap();
        let rendered = std::fs::read_to_string(&file).unwrap();
        // Every embedded newline picks up the line's indentation.
        assert_eq!(rendered, "  data: line1\n  line2\n");
    }

    #[test]
    fn test_file_variable_with_autoindent() {
        let temp = TempDir::new().unwrap();
        let notes = temp.path().join("notes.txt");
        std::fs::write(&notes, "hello\nworld").unwrap();

        let file = temp.path().join("msg.yaml");
        std::fs::write(&file, "  Msg: ###ZARF_VAR_REPLACE_ME###\n").unwrap();

        let templater = Templater::new().with_variables(&variables(&[(
            "REPLACE_ME",
            VariableValue {
                value: notes.to_string_lossy().to_string(),
                auto_indent: true,
                kind: VariableType::File,
                ..Default::default()
            },
        )]));

        templater.apply(&file).unwrap();
        let rendered = std::fs::read_to_string(&file).unwrap();
        assert_eq!(rendered, "  Msg: hello\n  world\n");
    }

    #[test]
    fn test_binary_file_variable_skipped() {
        let temp = TempDir::new().unwrap();
        let blob = temp.path().join("blob.bin");
        std::fs::write(&blob, [0u8, 159, 146, 150]).unwrap();

        let file = temp.path().join("msg.yaml");
        std::fs::write(&file, "data: ###ZARF_VAR_BLOB###\n").unwrap();

        let templater = Templater::new().with_variables(&variables(&[(
            "BLOB",
            VariableValue {
                value: blob.to_string_lossy().to_string(),
                kind: VariableType::File,
                ..Default::default()
            },
        )]));

        let warnings = templater.apply(&file).unwrap();
        assert_eq!(warnings.len(), 1);
        let rendered = std::fs::read_to_string(&file).unwrap();
        assert_eq!(rendered, "data: ###ZARF_VAR_BLOB###\n");
    }

    #[test]
    fn test_deprecated_token_resolves_and_warns() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("deploy.yaml");
        std::fs::write(&file, "registry: ###ZARF_REGISTRY_OLD###\n").unwrap();

        let templater = Templater::new()
            .with_application_template(
                "###ZARF_REGISTRY###",
                TemplateValue {
                    value: "registry.zarf.svc:5000".to_string(),
                    ..Default::default()
                },
            )
            .with_deprecated("###ZARF_REGISTRY_OLD###", "###ZARF_REGISTRY###");

        let warnings = templater.apply(&file).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("deprecated"));
        let rendered = std::fs::read_to_string(&file).unwrap();
        assert_eq!(rendered, "registry: registry.zarf.svc:5000\n");
    }

    #[test]
    fn test_substitution_is_single_pass() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f.yaml");
        std::fs::write(&file, "v: ###ZARF_VAR_A###\n").unwrap();

        // A's value contains another token; it must stay literal.
        let templater = Templater::new().with_variables(&variables(&[
            (
                "A",
                VariableValue {
                    value: "###ZARF_VAR_B###".to_string(),
                    ..Default::default()
                },
            ),
            (
                "B",
                VariableValue {
                    value: "never".to_string(),
                    ..Default::default()
                },
            ),
        ]));

        templater.apply(&file).unwrap();
        let rendered = std::fs::read_to_string(&file).unwrap();
        assert_eq!(rendered, "v: ###ZARF_VAR_B###\n");
    }
}
