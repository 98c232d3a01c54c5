//! Programmatic class file authoring

use super::annotation::{self, RUNTIME_VISIBLE_ANNOTATIONS};
use super::{access, Attribute, ClassFile, ConstantPool, MemberInfo};
use crate::error::Result;
use crate::metadata::MetadataHeader;

/// Java 8
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

const OP_RETURN: u8 = 0xB1;

/// `Code` attribute whose body is a single `return`
pub(crate) fn return_only_code(pool: &mut ConstantPool) -> Result<Attribute> {
    let name_index = pool.intern_utf8("Code")?;
    let mut info = Vec::with_capacity(13);
    info.extend_from_slice(&0u16.to_be_bytes()); // max_stack
    info.extend_from_slice(&0u16.to_be_bytes()); // max_locals
    info.extend_from_slice(&1u32.to_be_bytes());
    info.push(OP_RETURN);
    info.extend_from_slice(&0u16.to_be_bytes()); // exception_table_length
    info.extend_from_slice(&0u16.to_be_bytes()); // attributes_count
    Ok(Attribute { name_index, info })
}

struct PendingMember {
    access: u16,
    name: String,
    descriptor: String,
    deprecation: Option<String>,
}

/// Builder for class files
pub struct ClassFileBuilder {
    name: String,
    major_version: u16,
    access: u16,
    super_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<PendingMember>,
    methods: Vec<PendingMember>,
    last_is_method: bool,
    class_deprecation: Option<String>,
    metadata: Option<MetadataHeader>,
}

impl ClassFileBuilder {
    /// New public class extending `java/lang/Object`
    pub fn new(internal_name: &str) -> Self {
        Self {
            name: internal_name.to_string(),
            major_version: DEFAULT_MAJOR_VERSION,
            access: access::PUBLIC | access::SUPER,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            last_is_method: false,
            class_deprecation: None,
            metadata: None,
        }
    }

    pub fn version(mut self, major: u16) -> Self {
        self.major_version = major;
        self
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.access = flags;
        self
    }

    pub fn super_class(mut self, internal_name: &str) -> Self {
        self.super_name = Some(internal_name.to_string());
        self
    }

    pub fn interface(mut self, internal_name: &str) -> Self {
        self.interfaces.push(internal_name.to_string());
        self
    }

    pub fn field(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push(PendingMember {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            deprecation: None,
        });
        self.last_is_method = false;
        self
    }

    /// Method with a `return`-only body, or no body when abstract or native
    pub fn method(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        self.methods.push(PendingMember {
            access: flags,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            deprecation: None,
        });
        self.last_is_method = true;
        self
    }

    /// Annotate the most recently added member with `kotlin.Deprecated`
    pub fn deprecated(mut self, message: &str) -> Self {
        let last = if self.last_is_method { self.methods.last_mut() } else { self.fields.last_mut() };
        if let Some(member) = last {
            member.deprecation = Some(message.to_string());
        }
        self
    }

    /// Annotate the class itself with `kotlin.Deprecated`
    pub fn deprecated_class(mut self, message: &str) -> Self {
        self.class_deprecation = Some(message.to_string());
        self
    }

    /// Attach a `kotlin.Metadata` annotation
    pub fn metadata(mut self, header: MetadataHeader) -> Self {
        self.metadata = Some(header);
        self
    }

    pub fn build(self) -> Result<ClassFile> {
        let mut pool = ConstantPool::new();
        let this_class = pool.intern_class(&self.name)?;
        let super_class = match &self.super_name {
            Some(name) => pool.intern_class(name)?,
            None => 0,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|name| pool.intern_class(name))
            .collect::<Result<Vec<_>>>()?;

        let mut fields = Vec::with_capacity(self.fields.len());
        for pending in &self.fields {
            fields.push(build_member(&mut pool, pending, false)?);
        }
        let mut methods = Vec::with_capacity(self.methods.len());
        for pending in &self.methods {
            methods.push(build_member(&mut pool, pending, true)?);
        }

        let mut attributes = Vec::new();
        if let Some(header) = &self.metadata {
            let metadata = header.to_annotation(&mut pool)?;
            let name_index = pool.intern_utf8(RUNTIME_VISIBLE_ANNOTATIONS)?;
            attributes.push(Attribute { name_index, info: annotation::write_annotations(&[metadata]) });
        }
        if let Some(message) = &self.class_deprecation {
            annotation::set_deprecated_flag(&mut pool, &mut attributes)?;
            annotation::attach_deprecation(&mut pool, &mut attributes, message)?;
        }

        Ok(ClassFile {
            minor_version: 0,
            major_version: self.major_version,
            constant_pool: pool,
            access_flags: self.access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

fn build_member(pool: &mut ConstantPool, pending: &PendingMember, is_method: bool) -> Result<MemberInfo> {
    let name_index = pool.intern_utf8(&pending.name)?;
    let descriptor_index = pool.intern_utf8(&pending.descriptor)?;
    let mut attributes = Vec::new();
    if is_method && pending.access & (access::ABSTRACT | access::NATIVE) == 0 {
        attributes.push(return_only_code(pool)?);
    }
    if let Some(message) = &pending.deprecation {
        annotation::set_deprecated_flag(pool, &mut attributes)?;
        annotation::attach_deprecation(pool, &mut attributes, message)?;
    }
    Ok(MemberInfo { access_flags: pending.access, name_index, descriptor_index, attributes })
}
