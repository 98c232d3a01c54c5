//! Transform configuration (fence.toml)
//!
//! ```toml
//! message = "Use the v2 client"
//! patterns = ["class com.example.legacy.**"]
//!
//! [[rule]]
//! pattern = "class com.example.Api { public void reset(); }"
//! message = "reset() is going away"
//!
//! [[deprecate]]
//! class = "com.example.Client"
//! whole_class = false
//! functions = [{ name = "connect", args = ["java.lang.String", "int"] }]
//! constructors = [[], ["long"]]
//! properties = ["timeout"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::TransformPlan;
use crate::error::{Error, Result};
use crate::visitor::Pass;

/// Message attached when none is configured
pub const DEFAULT_MESSAGE: &str = "The class is deprecated within the project by KapiFence plugin";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FenceConfig {
    /// Deprecation message for every pass without its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Pattern strings, one pass each
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,

    #[serde(default, rename = "rule", skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,

    #[serde(default, rename = "deprecate", skip_serializing_if = "Vec::is_empty")]
    pub deprecations: Vec<DeprecateEntry>,
}

/// A pattern string with its own message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Declarative form of a class and the members to deprecate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeprecateEntry {
    /// Class name in dotted or internal form
    pub class: String,

    /// Deprecate the class itself, not only the listed members
    #[serde(default = "default_whole_class")]
    pub whole_class: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionEntry>,

    /// Argument lists of the constructors to deprecate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructors: Vec<Vec<String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,

    /// Argument types: `int`, `java.lang.Integer`, `***`, class names
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_whole_class() -> bool {
    true
}

impl FenceConfig {
    /// Parse configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Serialize configuration to a TOML string
    pub fn to_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))
    }

    /// Configured message, or [`DEFAULT_MESSAGE`]
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_MESSAGE)
    }

    /// Every pattern string with its message, in pass order: `patterns`,
    /// then `[[rule]]`, then the rendered `[[deprecate]]` entries
    pub fn pattern_strings(&self) -> Vec<(String, String)> {
        let message = self.message();
        let mut out: Vec<(String, String)> = self
            .patterns
            .iter()
            .map(|p| (p.clone(), message.to_string()))
            .collect();
        out.extend(self.rules.iter().map(|rule| {
            (rule.pattern.clone(), rule.message.clone().unwrap_or_else(|| message.to_string()))
        }));
        for entry in &self.deprecations {
            out.extend(entry.render().into_iter().map(|p| (p, message.to_string())));
        }
        out
    }

    /// Parse every pattern string. Fails on the first syntax error.
    pub fn passes(&self) -> Result<Vec<Pass>> {
        self.pattern_strings()
            .iter()
            .map(|(pattern, message)| Pass::parse(pattern, message))
            .collect()
    }

    pub fn plan(&self) -> Result<TransformPlan> {
        Ok(TransformPlan::new(self.passes()?))
    }
}

impl DeprecateEntry {
    /// Pattern strings for this entry: the class itself, then one string
    /// with all functions and constructors, then one with all properties.
    /// Empty member groups render nothing, since an empty member list would
    /// target the whole class.
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.whole_class {
            out.push(format!("class {}", self.class));
        }

        let mut functions = String::new();
        for function in &self.functions {
            functions.push_str(&format!("    *** {}({});\n", function.name, function.args.join(", ")));
        }
        for args in &self.constructors {
            functions.push_str(&format!("    *** <init>({});\n", args.join(", ")));
        }
        if !functions.is_empty() {
            out.push(format!("class {} {{\n{}}}\n", self.class, functions));
        }

        let mut properties = String::new();
        for property in &self.properties {
            properties.push_str(&format!("    private *** {};\n", property));
        }
        if !properties.is_empty() {
            out.push(format!("class {} {{\n{}}}\n", self.class, properties));
        }
        out
    }
}
