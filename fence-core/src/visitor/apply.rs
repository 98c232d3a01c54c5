//! Phase 2: replay the container and apply the decisions
//!
//! The replay walks the container once: header, fields, methods, end. Each
//! step reads the immutable [`DecisionTable`] plus the property plan derived
//! from it before the walk starts.

use tracing::{debug, warn};

use super::decision::DecisionTable;
use super::PassReport;
use crate::classfile::annotation::{self, METADATA_DESC, RUNTIME_VISIBLE_ANNOTATIONS};
use crate::classfile::builder::return_only_code;
use crate::classfile::{access, ClassFile, MemberInfo};
use crate::error::Result;
use crate::keep::MemberKind;
use crate::metadata::conventions::MetadataConventions;
use crate::metadata::{MetadataDecodeError, MetadataSymbolTable};

/// Interfaces only allow static methods from Java 8 on
const MIN_MAJOR_FOR_INTERFACE_STATICS: u16 = 52;

const HOLDER_ACCESS: u16 = access::PUBLIC | access::STATIC | access::SYNTHETIC;

/// A deprecated field whose annotation moves to its Kotlin property. The
/// holder is only synthesized while the metadata that references it is
/// still being rewritten.
#[derive(Debug, Clone)]
struct PropertyPlan {
    field: usize,
    property: usize,
    message: String,
    getter: Option<usize>,
    holder_name: String,
    /// Index of an already existing holder method
    holder: Option<usize>,
}

pub(super) struct Replay<'a> {
    class: &'a mut ClassFile,
    table: &'a DecisionTable,
    metadata: Option<MetadataSymbolTable>,
    conventions: &'a dyn MetadataConventions,
    plans: Vec<PropertyPlan>,
    report: &'a mut PassReport,
}

impl<'a> Replay<'a> {
    pub(super) fn new(
        class: &'a mut ClassFile,
        table: &'a DecisionTable,
        metadata: Option<MetadataSymbolTable>,
        conventions: &'a dyn MetadataConventions,
        report: &'a mut PassReport,
    ) -> Result<Self> {
        let mut replay = Self { class, table, metadata, conventions, plans: Vec::new(), report };
        replay.plans = replay.plan_properties()?;
        Ok(replay)
    }

    pub(super) fn run(mut self) -> Result<()> {
        self.on_container_header()?;
        for index in 0..self.class.fields.len() {
            self.on_field(index)?;
        }
        for index in 0..self.class.methods.len() {
            self.on_method(index)?;
        }
        self.on_end()
    }

    fn plan_properties(&self) -> Result<Vec<PropertyPlan>> {
        let Some(metadata) = self.metadata.as_ref().filter(|m| m.is_class()) else {
            return Ok(Vec::new());
        };
        if self.class.is_interface() && self.class.major_version < MIN_MAJOR_FOR_INTERFACE_STATICS {
            return Ok(Vec::new());
        }

        let holder_descriptor = self.conventions.annotation_holder_descriptor();
        let mut plans = Vec::new();
        for (index, field) in self.class.fields.iter().enumerate() {
            let name = self.class.member_name(field)?;
            let descriptor = self.class.member_descriptor(field)?;
            let Some(message) = self.table.member_message(MemberKind::Field, &name, &descriptor) else {
                continue;
            };
            let Some(property) = metadata.find_property_for_field(&name) else {
                continue;
            };

            let symbol = &metadata.properties[property];
            let (getter_name, getter_descriptor) = metadata.getter_of(symbol, self.conventions);
            let holder_name = self.conventions.annotation_holder_name(&symbol.name);
            let mut getter = None;
            let mut holder = None;
            for (method_index, method) in self.class.methods.iter().enumerate() {
                let method_name = self.class.member_name(method)?;
                let method_descriptor = self.class.member_descriptor(method)?;
                if getter.is_none()
                    && symbol.has_getter
                    && method_name == getter_name
                    && getter_descriptor.as_deref().is_none_or(|d| d == method_descriptor)
                {
                    getter = Some(method_index);
                }
                if holder.is_none() && method_name == holder_name && method_descriptor == holder_descriptor {
                    holder = Some(method_index);
                }
            }

            plans.push(PropertyPlan { field: index, property, message: message.to_string(), getter, holder_name, holder });
        }
        Ok(plans)
    }

    fn on_container_header(&mut self) -> Result<()> {
        if self.table.class_message().is_some() {
            let class = &mut *self.class;
            if annotation::set_deprecated_flag(&mut class.constant_pool, &mut class.attributes)? {
                self.report.class_deprecated = true;
            }
            let marked = self.metadata.as_mut().map(|m| m.mark_class()).transpose();
            self.record_mark(marked);
        }
        Ok(())
    }

    fn on_field(&mut self, index: usize) -> Result<()> {
        let field = &self.class.fields[index];
        let name = self.class.member_name(field)?;
        let descriptor = self.class.member_descriptor(field)?;
        let table = self.table;
        let Some(message) = table.member_message(MemberKind::Field, &name, &descriptor) else {
            return Ok(());
        };

        let plan = self.plans.iter().find(|p| p.field == index).cloned();
        let class = &mut *self.class;
        let member = &mut class.fields[index];
        let mut changed = annotation::set_deprecated_flag(&mut class.constant_pool, &mut member.attributes)?;

        match plan {
            Some(plan) => {
                // without a getter the field keeps the annotation too
                if plan.getter.is_none() {
                    changed |= annotation::attach_deprecation(&mut class.constant_pool, &mut member.attributes, message)?;
                }
                let holder_descriptor = self.conventions.annotation_holder_descriptor();
                let marked = self
                    .metadata
                    .as_mut()
                    .map(|m| m.mark_property(plan.property, &plan.holder_name, holder_descriptor))
                    .transpose();
                self.record_mark(marked);
            }
            None => {
                changed |= annotation::attach_deprecation(&mut class.constant_pool, &mut member.attributes, message)?;
            }
        }

        if changed {
            debug!(field = %name, "deprecated field");
            self.report.fields_deprecated += 1;
        }
        Ok(())
    }

    fn on_method(&mut self, index: usize) -> Result<()> {
        let method = &self.class.methods[index];
        let name = self.class.member_name(method)?;
        let descriptor = self.class.member_descriptor(method)?;

        let decided = self.table.member_message(MemberKind::Method, &name, &descriptor).map(str::to_string);
        let companion = self
            .plans
            .iter()
            .find(|p| p.getter == Some(index) || p.holder == Some(index))
            .map(|p| p.message.clone());
        let Some(message) = decided.clone().or(companion) else {
            return Ok(());
        };

        if self.deprecate_method(index, &message)? {
            debug!(method = %name, descriptor = %descriptor, "deprecated method");
            if self.plans.iter().any(|p| p.holder == Some(index)) {
                self.report.holders += 1;
            } else {
                self.report.methods_deprecated += 1;
            }
        }

        if decided.is_some() {
            let marked = match self.metadata.as_mut() {
                Some(metadata) if name == "<init>" => {
                    metadata.find_constructor(&descriptor).map(|i| metadata.mark_constructor(i)).transpose()
                }
                Some(metadata) => metadata
                    .find_function(&name, &descriptor, self.conventions)
                    .map(|i| metadata.mark_function(i))
                    .transpose(),
                None => Ok(None),
            };
            self.record_mark(marked);
        }
        Ok(())
    }

    fn on_end(mut self) -> Result<()> {
        if self.metadata.is_some() {
            let missing: Vec<PropertyPlan> = self.plans.iter().filter(|p| p.holder.is_none()).cloned().collect();
            for plan in missing {
                self.synthesize_holder(&plan)?;
            }
        }

        let table = self.table;
        if let Some(message) = table.class_message() {
            let class = &mut *self.class;
            if annotation::attach_deprecation(&mut class.constant_pool, &mut class.attributes, message)? {
                self.report.class_deprecated = true;
            }
        }

        if let Some(metadata) = self.metadata.as_ref().filter(|m| m.is_modified()) {
            let header = metadata.encode();
            let class = &mut *self.class;
            let pool = &mut class.constant_pool;
            if let Some(i) = annotation::find_attribute(pool, &class.attributes, RUNTIME_VISIBLE_ANNOTATIONS) {
                let mut annotations = annotation::parse_annotations(&class.attributes[i].info)?;
                let position = annotations
                    .iter()
                    .position(|a| a.type_descriptor(pool).as_deref() == Some(METADATA_DESC));
                if let Some(position) = position {
                    annotations[position] = header.replace_payload(&annotations[position], pool)?;
                    class.attributes[i].info = annotation::write_annotations(&annotations);
                    self.report.metadata_updated = true;
                }
            }
        }
        Ok(())
    }

    fn deprecate_method(&mut self, index: usize, message: &str) -> Result<bool> {
        let class = &mut *self.class;
        let member = &mut class.methods[index];
        let flagged = annotation::set_deprecated_flag(&mut class.constant_pool, &mut member.attributes)?;
        let annotated = annotation::attach_deprecation(&mut class.constant_pool, &mut member.attributes, message)?;
        Ok(flagged || annotated)
    }

    fn synthesize_holder(&mut self, plan: &PropertyPlan) -> Result<()> {
        let class = &mut *self.class;
        let pool = &mut class.constant_pool;
        let name_index = pool.intern_utf8(&plan.holder_name)?;
        let descriptor_index = pool.intern_utf8(self.conventions.annotation_holder_descriptor())?;
        let mut attributes = vec![return_only_code(pool)?];
        annotation::set_deprecated_flag(pool, &mut attributes)?;
        annotation::attach_deprecation(pool, &mut attributes, &plan.message)?;

        class.methods.push(MemberInfo { access_flags: HOLDER_ACCESS, name_index, descriptor_index, attributes });
        debug!(holder = %plan.holder_name, "synthesized annotation holder");
        self.report.holders += 1;
        Ok(())
    }

    /// Count a metadata mark, or give up on metadata after a failure
    fn record_mark(&mut self, result: std::result::Result<Option<bool>, MetadataDecodeError>) {
        match result {
            Ok(Some(true)) => self.report.metadata_symbols_marked += 1,
            Ok(_) => {}
            Err(err) => {
                warn!(class = %self.report.class_name, error = %err, "metadata left untouched");
                self.report.metadata_warning = Some(err);
                self.metadata = None;
            }
        }
    }
}
