//! Structural visitor
//!
//! One pass over one class file in two phases: [`DecisionTable::build`]
//! decides which declarations are targeted, then the replay applies the
//! deprecated flag, the `kotlin.Deprecated` annotation and the matching
//! metadata marks.

mod apply;
pub mod decision;

use tracing::warn;

use crate::classfile::annotation::{self, METADATA_DESC};
use crate::classfile::ClassFile;
use crate::error::Result;
use crate::keep::{parse_keep_specifications, KeepSpecification};
use crate::metadata::conventions::{KotlinJvmConventions, MetadataConventions};
use crate::metadata::{self, MetadataDecodeError, MetadataHeader, MetadataSymbolTable};

pub use decision::DecisionTable;

/// A keep specification with the message it attaches
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub spec: KeepSpecification,
    pub message: String,
}

/// The rules of one pattern string. Each pass runs over the output of the
/// previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub source: String,
    pub rules: Vec<Rule>,
}

impl Pass {
    pub fn parse(pattern: &str, message: &str) -> Result<Self> {
        let rules = parse_keep_specifications(pattern)?
            .into_iter()
            .map(|spec| Rule { spec, message: message.to_string() })
            .collect();
        Ok(Self { source: pattern.to_string(), rules })
    }
}

/// What one pass did to one class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub class_name: String,
    pub class_deprecated: bool,
    pub fields_deprecated: usize,
    pub methods_deprecated: usize,
    /// Annotation holders synthesized or annotated
    pub holders: usize,
    pub metadata_symbols_marked: usize,
    pub metadata_updated: bool,
    pub metadata_warning: Option<MetadataDecodeError>,
}

impl PassReport {
    pub fn changed(&self) -> bool {
        self.class_deprecated
            || self.fields_deprecated > 0
            || self.methods_deprecated > 0
            || self.holders > 0
            || self.metadata_updated
    }
}

/// Run one pass over a class file with the default Kotlin/JVM conventions
pub fn transform_class(bytes: &[u8], rules: &[Rule]) -> Result<(Vec<u8>, PassReport)> {
    transform_class_with(bytes, rules, &KotlinJvmConventions)
}

/// Run one pass over a class file. Unchanged classes come back as the
/// original bytes.
pub fn transform_class_with(
    bytes: &[u8],
    rules: &[Rule],
    conventions: &dyn MetadataConventions,
) -> Result<(Vec<u8>, PassReport)> {
    let mut class = ClassFile::from_bytes(bytes)?;
    let container = class.declaration_container()?;
    let mut report = PassReport { class_name: container.binary_name.clone(), ..PassReport::default() };

    let table = DecisionTable::build(&container, rules);
    if table.is_empty() {
        return Ok((bytes.to_vec(), report));
    }

    let metadata = match read_metadata(&class) {
        Some(Ok(table)) => Some(table),
        Some(Err(err)) => {
            warn!(class = %report.class_name, error = %err, "metadata left untouched");
            report.metadata_warning = Some(err);
            None
        }
        None => None,
    };

    apply::Replay::new(&mut class, &table, metadata, conventions, &mut report)?.run()?;

    if report.changed() {
        Ok((class.to_bytes(), report))
    } else {
        Ok((bytes.to_vec(), report))
    }
}

/// `kotlin.Metadata` header of a class, if it has one
pub fn read_metadata_header(class: &ClassFile) -> Option<std::result::Result<MetadataHeader, MetadataDecodeError>> {
    let pool = &class.constant_pool;
    let annotations = match annotation::visible_annotations(pool, &class.attributes) {
        Ok(list) => list,
        Err(err) => return Some(Err(MetadataDecodeError::Encoding(err.to_string()))),
    };
    let metadata = annotations
        .iter()
        .find(|a| a.type_descriptor(pool).as_deref() == Some(METADATA_DESC))?;
    Some(MetadataHeader::from_annotation(metadata, pool))
}

/// Decoded metadata of a class, if it has any
pub fn read_metadata(class: &ClassFile) -> Option<std::result::Result<MetadataSymbolTable, MetadataDecodeError>> {
    read_metadata_header(class).map(|header| header.and_then(|h| metadata::decode(&h)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::annotation::{has_deprecated_attribute, visible_annotations};
    use crate::classfile::{access, ClassFileBuilder, MemberInfo};
    use crate::metadata::ClassMetadataBuilder;

    const MESSAGE: &str = "Use the new API";

    fn pass(pattern: &str) -> Vec<Rule> {
        Pass::parse(pattern, MESSAGE).unwrap().rules
    }

    fn find<'a>(class: &ClassFile, members: &'a [MemberInfo], name: &str) -> &'a MemberInfo {
        members.iter().find(|m| class.member_name(m).unwrap() == name).unwrap()
    }

    fn deprecation_message(class: &ClassFile, member: &MemberInfo) -> Option<String> {
        let pool = &class.constant_pool;
        visible_annotations(pool, &member.attributes)
            .unwrap()
            .iter()
            .find(|a| a.type_descriptor(pool).as_deref() == Some(annotation::DEPRECATED_DESC))
            .and_then(|a| a.message(pool))
    }

    fn is_flagged(class: &ClassFile, member: &MemberInfo) -> bool {
        has_deprecated_attribute(&class.constant_pool, &member.attributes)
    }

    fn java_class() -> Vec<u8> {
        ClassFileBuilder::new("com/x/Y")
            .method(access::PUBLIC, "foo", "()V")
            .method(access::PUBLIC, "bar", "(I)V")
            .method(access::PRIVATE, "baz", "()V")
            .field(access::PUBLIC, "size", "I")
            .build()
            .unwrap()
            .to_bytes()
    }

    #[test]
    fn test_public_void_methods_scenario() {
        let (out, report) = transform_class(&java_class(), &pass("class com.x.Y { public void *(); }")).unwrap();
        assert_eq!(report.methods_deprecated, 2);
        assert!(report.changed());

        let class = ClassFile::from_bytes(&out).unwrap();
        for name in ["foo", "bar"] {
            let method = find(&class, &class.methods, name);
            assert!(is_flagged(&class, method));
            assert_eq!(deprecation_message(&class, method).as_deref(), Some(MESSAGE));
        }
        let baz = find(&class, &class.methods, "baz");
        assert!(!is_flagged(&class, baz));
        assert_eq!(deprecation_message(&class, baz), None);
        assert!(!has_deprecated_attribute(&class.constant_pool, &class.attributes));
    }

    #[test]
    fn test_unmatched_class_is_untouched() {
        let input = java_class();
        let (out, report) = transform_class(&input, &pass("class com.other.Z")).unwrap();
        assert_eq!(out, input);
        assert!(!report.changed());
    }

    #[test]
    fn test_class_level_deprecation() {
        let (out, report) = transform_class(&java_class(), &pass("class com.x.*")).unwrap();
        assert!(report.class_deprecated);
        let class = ClassFile::from_bytes(&out).unwrap();
        assert!(class.declaration_container().unwrap().deprecated);
        assert!(has_deprecated_attribute(&class.constant_pool, &class.attributes));
    }

    #[test]
    fn test_second_pass_is_identity() {
        let rules = pass("class com.x.Y { public void *(); public int size; }");
        let (once, _) = transform_class(&java_class(), &rules).unwrap();
        let (twice, report) = transform_class(&once, &rules).unwrap();
        assert_eq!(once, twice);
        assert!(!report.changed());
    }

    #[test]
    fn test_existing_message_is_kept() {
        let input = ClassFileBuilder::new("a/B")
            .method(access::PUBLIC, "run", "()V")
            .deprecated("original")
            .build()
            .unwrap()
            .to_bytes();
        let (out, report) = transform_class(&input, &pass("class a.B { *** run(); }")).unwrap();
        assert_eq!(out, input);
        assert!(!report.changed());
    }

    #[test]
    fn test_annotated_class_without_flag_gets_flag() {
        let mut input = ClassFileBuilder::new("a/B").deprecated_class("original").build().unwrap();
        let index =
            annotation::find_attribute(&input.constant_pool, &input.attributes, annotation::DEPRECATED_ATTRIBUTE)
                .unwrap();
        input.attributes.remove(index);
        assert!(input.declaration_container().unwrap().deprecated);

        let (out, report) = transform_class(&input.to_bytes(), &pass("class a.B")).unwrap();
        assert!(report.class_deprecated);
        let class = ClassFile::from_bytes(&out).unwrap();
        assert!(has_deprecated_attribute(&class.constant_pool, &class.attributes));
        let pool = &class.constant_pool;
        let annotations = visible_annotations(pool, &class.attributes).unwrap();
        let messages: Vec<_> = annotations
            .iter()
            .filter(|a| a.type_descriptor(pool).as_deref() == Some(annotation::DEPRECATED_DESC))
            .map(|a| a.message(pool))
            .collect();
        assert_eq!(messages, [Some("original".to_string())]);
    }

    #[test]
    fn test_java_field_gets_annotation() {
        let (out, report) = transform_class(&java_class(), &pass("class com.x.Y { int size; }")).unwrap();
        assert_eq!(report.fields_deprecated, 1);
        let class = ClassFile::from_bytes(&out).unwrap();
        let field = find(&class, &class.fields, "size");
        assert!(is_flagged(&class, field));
        assert_eq!(deprecation_message(&class, field).as_deref(), Some(MESSAGE));
        assert_eq!(report.holders, 0);
    }

    fn kotlin_class() -> Vec<u8> {
        let metadata = ClassMetadataBuilder::new("com/k/Service")
            .module_name("mymodule_main")
            .function("start", Some("()V"))
            .internal_function("compute", Some("()I"))
            .property("count", "I", Some(("getCount", "()I")))
            .constructor("()V")
            .build();
        ClassFileBuilder::new("com/k/Service")
            .field(access::PRIVATE | access::FINAL, "count", "I")
            .method(access::PUBLIC, "<init>", "()V")
            .method(access::PUBLIC | access::FINAL, "start", "()V")
            .method(access::PUBLIC | access::FINAL, "compute$mymodule_main", "()I")
            .method(access::PUBLIC | access::FINAL, "getCount", "()I")
            .metadata(metadata)
            .build()
            .unwrap()
            .to_bytes()
    }

    fn decoded(bytes: &[u8]) -> MetadataSymbolTable {
        let class = ClassFile::from_bytes(bytes).unwrap();
        read_metadata(&class).unwrap().unwrap()
    }

    #[test]
    fn test_internal_function_marks_metadata() {
        let (out, report) =
            transform_class(&kotlin_class(), &pass("class com.k.Service { *** compute$mymodule_main(); }")).unwrap();
        assert_eq!(report.methods_deprecated, 1);
        assert_eq!(report.metadata_symbols_marked, 1);
        assert!(report.metadata_updated);

        let table = decoded(&out);
        assert!(table.functions[1].has_annotations);
        assert!(!table.functions[0].has_annotations);
    }

    #[test]
    fn test_constructor_marks_metadata() {
        let (out, report) = transform_class(&kotlin_class(), &pass("class com.k.Service { <init>(); }")).unwrap();
        assert_eq!(report.metadata_symbols_marked, 1);
        assert!(decoded(&out).constructors[0].has_annotations);
    }

    #[test]
    fn test_class_level_marks_class_metadata() {
        let (out, report) = transform_class(&kotlin_class(), &pass("class com.k.Service")).unwrap();
        assert!(report.class_deprecated);
        assert_eq!(report.metadata_symbols_marked, 1);
        assert!(report.metadata_updated);

        let table = decoded(&out);
        assert!(table.class_has_annotations);
        assert!(table.functions.iter().all(|f| !f.has_annotations));

        let (twice, report) = transform_class(&out, &pass("class com.k.Service")).unwrap();
        assert_eq!(twice, out);
        assert!(!report.changed());
    }

    #[test]
    fn test_kotlin_property_goes_through_getter_and_holder() {
        let (out, report) = transform_class(&kotlin_class(), &pass("class com.k.Service { private int count; }")).unwrap();
        assert_eq!(report.fields_deprecated, 1);
        assert_eq!(report.holders, 1);
        assert_eq!(report.metadata_symbols_marked, 1);

        let class = ClassFile::from_bytes(&out).unwrap();
        let field = find(&class, &class.fields, "count");
        assert!(is_flagged(&class, field));
        assert_eq!(deprecation_message(&class, field), None);

        let getter = find(&class, &class.methods, "getCount");
        assert!(is_flagged(&class, getter));
        assert_eq!(deprecation_message(&class, getter).as_deref(), Some(MESSAGE));

        let holder = find(&class, &class.methods, "getCount$annotations");
        assert_eq!(holder.access_flags, access::PUBLIC | access::STATIC | access::SYNTHETIC);
        assert_eq!(class.member_descriptor(holder).unwrap(), "()V");
        assert_eq!(deprecation_message(&class, holder).as_deref(), Some(MESSAGE));

        let property = &decoded(&out).properties[0];
        assert!(property.has_annotations);
        let signature = property.synthetic_holder_signature.as_ref().unwrap();
        assert_eq!(signature.name.as_deref(), Some("getCount$annotations"));
    }

    #[test]
    fn test_kotlin_property_is_idempotent() {
        let rules = pass("class com.k.Service { private int count; }");
        let (once, _) = transform_class(&kotlin_class(), &rules).unwrap();
        let (twice, report) = transform_class(&once, &rules).unwrap();
        assert_eq!(once, twice);
        assert!(!report.changed());
    }

    #[test]
    fn test_unsupported_metadata_still_deprecates() {
        let metadata = ClassMetadataBuilder::new("com/k/Old").version(&[1, 3, 0]).property("x", "I", None).build();
        let input = ClassFileBuilder::new("com/k/Old")
            .field(access::PRIVATE, "x", "I")
            .metadata(metadata)
            .build()
            .unwrap();
        let original_metadata = input.attributes.clone();
        let (out, report) = transform_class(&input.to_bytes(), &pass("class com.k.Old { int x; }")).unwrap();

        assert!(matches!(report.metadata_warning, Some(MetadataDecodeError::UnsupportedVersion(_))));
        assert!(!report.metadata_updated);
        let class = ClassFile::from_bytes(&out).unwrap();
        assert_eq!(class.attributes, original_metadata);
        let field = find(&class, &class.fields, "x");
        assert_eq!(deprecation_message(&class, field).as_deref(), Some(MESSAGE));
    }

    #[test]
    fn test_old_interface_gets_no_holder() {
        let metadata = ClassMetadataBuilder::new("com/k/I").property("x", "I", Some(("getX", "()I"))).build();
        let input = ClassFileBuilder::new("com/k/I")
            .version(50)
            .access(access::PUBLIC | access::INTERFACE | access::ABSTRACT)
            .field(access::PUBLIC | access::STATIC | access::FINAL, "x", "I")
            .metadata(metadata)
            .build()
            .unwrap()
            .to_bytes();
        let (out, report) = transform_class(&input, &pass("interface com.k.I { int x; }")).unwrap();
        assert_eq!(report.holders, 0);
        let class = ClassFile::from_bytes(&out).unwrap();
        let field = find(&class, &class.fields, "x");
        assert_eq!(deprecation_message(&class, field).as_deref(), Some(MESSAGE));
    }

    #[test]
    fn test_malformed_class_is_an_error() {
        assert!(transform_class(b"not a class", &pass("class **")).is_err());
    }
}
