//! Typed deploy-time variables and package constants

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Value type of a variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// The value is used verbatim
    #[default]
    Raw,
    /// The value names a file whose contents are substituted
    File,
}

/// A deploy-time variable declared by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Uppercase+underscore name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Prompt the operator at deploy time when unset
    #[serde(default, skip_serializing_if = "is_false")]
    pub prompt: bool,

    /// Never log or persist the value
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,

    /// Indent multi-line values to match the template token's column
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_indent: bool,

    /// Regex the supplied value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "is_raw")]
    pub kind: VariableType,
}

/// A package constant - like a variable but fixed at create time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constant {
    pub name: String,
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_indent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// A variable captured from an action's stdout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariable {
    pub name: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_indent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "is_raw")]
    pub kind: VariableType,
}

/// A resolved variable value carried through templating and actions
#[derive(Debug, Clone, Default)]
pub struct VariableValue {
    pub value: String,
    pub sensitive: bool,
    pub auto_indent: bool,
    pub kind: VariableType,
}

/// Resolved variables keyed by name, in declaration order
pub type SetVariableMap = IndexMap<String, VariableValue>;

fn is_false(b: &bool) -> bool {
    !b
}

fn is_raw(t: &VariableType) -> bool {
    *t == VariableType::Raw
}

fn validate_token_name(name: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Z0-9_]+$").expect("static regex");
    if !re.is_match(name) {
        return Err(CoreError::InvalidDefinition {
            message: format!(
                "name '{}' must contain only uppercase letters, numbers and underscores",
                name
            ),
        });
    }
    Ok(())
}

impl Variable {
    pub fn validate(&self) -> Result<()> {
        validate_token_name(&self.name)
    }

    /// Resolve this variable against an operator-supplied value map
    pub fn resolve(&self, supplied: Option<&str>) -> Result<VariableValue> {
        let value = supplied
            .map(str::to_string)
            .or_else(|| self.default.clone())
            .unwrap_or_default();
        if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern).map_err(|_| CoreError::PatternMismatch {
                name: self.name.clone(),
                pattern: pattern.clone(),
            })?;
            if !re.is_match(&value) {
                return Err(CoreError::PatternMismatch {
                    name: self.name.clone(),
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(VariableValue {
            value,
            sensitive: self.sensitive,
            auto_indent: self.auto_indent,
            kind: self.kind,
        })
    }
}

impl Constant {
    pub fn validate(&self) -> Result<()> {
        validate_token_name(&self.name)?;
        if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern).map_err(|_| CoreError::PatternMismatch {
                name: self.name.clone(),
                pattern: pattern.clone(),
            })?;
            if !re.is_match(&self.value) {
                return Err(CoreError::PatternMismatch {
                    name: self.name.clone(),
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }
}

impl SetVariable {
    pub fn validate(&self) -> Result<()> {
        validate_token_name(&self.name)
    }
}

/// Resolve all declared variables against operator input, in declaration order.
pub fn resolve_variables(
    declared: &[Variable],
    supplied: &IndexMap<String, String>,
) -> Result<SetVariableMap> {
    let mut map = SetVariableMap::new();
    for variable in declared {
        let value = variable.resolve(supplied.get(&variable.name).map(String::as_str))?;
        map.insert(variable.name.clone(), value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        let v = Variable {
            name: "DB_PASSWORD".to_string(),
            ..Default::default()
        };
        assert!(v.validate().is_ok());

        let v = Variable {
            name: "db-password".to_string(),
            ..Default::default()
        };
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_resolve_precedence() {
        let v = Variable {
            name: "REGION".to_string(),
            default: Some("us-east-1".to_string()),
            ..Default::default()
        };
        assert_eq!(v.resolve(None).unwrap().value, "us-east-1");
        assert_eq!(v.resolve(Some("eu-west-1")).unwrap().value, "eu-west-1");
    }

    #[test]
    fn test_pattern_enforced() {
        let v = Variable {
            name: "PORT".to_string(),
            pattern: Some(r"^\d+$".to_string()),
            ..Default::default()
        };
        assert!(v.resolve(Some("8080")).is_ok());
        assert!(v.resolve(Some("eight")).is_err());
    }

    #[test]
    fn test_constant_pattern() {
        let c = Constant {
            name: "IMAGE_TAG".to_string(),
            value: "v1.2.3".to_string(),
            pattern: Some(r"^v\d".to_string()),
            ..Default::default()
        };
        assert!(c.validate().is_ok());

        let c = Constant {
            value: "latest".to_string(),
            ..c
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_resolution_order_preserved() {
        let declared = vec![
            Variable {
                name: "B".to_string(),
                default: Some("2".to_string()),
                ..Default::default()
            },
            Variable {
                name: "A".to_string(),
                default: Some("1".to_string()),
                ..Default::default()
            },
        ];
        let map = resolve_variables(&declared, &IndexMap::new()).unwrap();
        let names: Vec<_> = map.keys().cloned().collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
