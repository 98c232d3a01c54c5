//! Phase 1: decide what each declaration gets

use std::collections::HashMap;

use tracing::debug;

use super::Rule;
use crate::classfile::DeclarationContainer;
use crate::keep::MemberKind;

pub type DeclarationKey = (MemberKind, String, String);

/// Winning message per targeted declaration. Built once per container and
/// read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionTable {
    class: Option<String>,
    members: HashMap<DeclarationKey, String>,
}

impl DecisionTable {
    /// Rules are tried in order and the first match wins. A rule can decide
    /// the class and its concrete members at once. Declarations that already
    /// carry a deprecation annotation stay targeted; the replay keeps their
    /// message.
    pub fn build(container: &DeclarationContainer, rules: &[Rule]) -> Self {
        let mut table = Self::default();

        for rule in rules {
            if !rule.spec.matches_container(container) {
                continue;
            }

            if rule.spec.is_class_level() && table.class.is_none() {
                debug!(class = %container.binary_name, rule = %rule.spec, "class matched");
                table.class = Some(rule.message.clone());
            }

            for member in &container.members {
                if !rule.spec.matches_member(member.kind, &member.name, &member.descriptor, member.access_flags) {
                    continue;
                }
                let key = (member.kind, member.name.clone(), member.descriptor.clone());
                table.members.entry(key).or_insert_with(|| {
                    debug!(
                        class = %container.binary_name,
                        member = %member.name,
                        descriptor = %member.descriptor,
                        "member matched"
                    );
                    rule.message.clone()
                });
            }
        }

        table
    }

    pub fn class_message(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn member_message(&self, kind: MemberKind, name: &str, descriptor: &str) -> Option<&str> {
        self.members
            .get(&(kind, name.to_string(), descriptor.to_string()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.class.is_none() && self.members.is_empty()
    }

    #[cfg(test)]
    fn member_count(&self) -> usize {
        self.members.len()
    }
}
