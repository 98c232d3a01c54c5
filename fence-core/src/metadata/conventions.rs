//! Compiler naming conventions the metadata relies on
//!
//! These are the version-specific parts of the Kotlin/JVM ABI. The visitor
//! only talks to them through [`MetadataConventions`].

/// Module name assumed when the class does not record one
pub const DEFAULT_MODULE_NAME: &str = "main";

pub trait MetadataConventions {
    /// JVM name of a function compiled from `name`; internal functions
    /// carry a module suffix
    fn function_jvm_name(&self, name: &str, is_internal: bool, module_name: &str) -> String;

    /// Name of the getter generated for a property
    fn getter_name(&self, property_name: &str) -> String;

    /// Name of the synthetic method carrying a property's annotations
    fn annotation_holder_name(&self, property_name: &str) -> String;

    /// Descriptor of that synthetic method
    fn annotation_holder_descriptor(&self) -> &str {
        "()V"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KotlinJvmConventions;

impl MetadataConventions for KotlinJvmConventions {
    fn function_jvm_name(&self, name: &str, is_internal: bool, module_name: &str) -> String {
        if is_internal {
            format!("{}${}", name, sanitize_as_java_identifier(module_name))
        } else {
            name.to_string()
        }
    }

    fn getter_name(&self, property_name: &str) -> String {
        if starts_with_is_prefix(property_name) {
            property_name.to_string()
        } else {
            format!("get{}", capitalize_ascii(property_name))
        }
    }

    fn annotation_holder_name(&self, property_name: &str) -> String {
        format!("{}$annotations", self.getter_name(property_name))
    }
}

/// Every char that is not a letter or digit becomes `_`
pub fn sanitize_as_java_identifier(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

fn starts_with_is_prefix(name: &str) -> bool {
    match name.strip_prefix("is") {
        Some(rest) => !rest.starts_with(|c: char| c.is_ascii_lowercase()),
        None => false,
    }
}

fn capitalize_ascii(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_function_mangling() {
        let c = KotlinJvmConventions;
        assert_eq!(c.function_jvm_name("compute", true, "mymodule_main"), "compute$mymodule_main");
        assert_eq!(c.function_jvm_name("compute", true, "my-module.main"), "compute$my_module_main");
        assert_eq!(c.function_jvm_name("compute", false, "mymodule_main"), "compute");
    }

    #[test]
    fn test_getter_and_holder_names() {
        let c = KotlinJvmConventions;
        assert_eq!(c.getter_name("name"), "getName");
        assert_eq!(c.getter_name("isOpen"), "isOpen");
        assert_eq!(c.getter_name("is"), "is");
        assert_eq!(c.getter_name("issue"), "getIssue");
        assert_eq!(c.annotation_holder_name("count"), "getCount$annotations");
        assert_eq!(c.annotation_holder_descriptor(), "()V");
    }
}
