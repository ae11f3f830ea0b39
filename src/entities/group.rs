// 👥 Group Entity - convenience grouping for expense entry
// Not used by the balance engine itself.

use crate::entities::person::PersonId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,

    /// Member ids in insertion order, no duplicates
    pub members: Vec<PersonId>,
}

impl Group {
    pub fn new(name: &str, members: Vec<PersonId>) -> Self {
        let mut group = Group {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            members: Vec::new(),
        };
        group.set_members(members);
        group
    }

    /// Replace members, dropping repeated ids but keeping first-seen order
    pub fn set_members(&mut self, members: Vec<PersonId>) {
        self.members.clear();
        for member in members {
            if !self.members.contains(&member) {
                self.members.push(member);
            }
        }
    }

    pub fn has_member(&self, person_id: &str) -> bool {
        self.members.iter().any(|m| m == person_id)
    }

    pub fn remove_member(&mut self, person_id: &str) {
        self.members.retain(|m| m != person_id);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupRegistry {
    groups: BTreeMap<String, Group>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, group: Group) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn remove(&mut self, id: &str) -> Option<Group> {
        self.groups.remove(id)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    /// Drop a person from every group (friend deleted)
    pub fn remove_member_everywhere(&mut self, person_id: &str) {
        for group in self.groups.values_mut() {
            group.remove_member(person_id);
        }
    }

    /// Groups sorted by name
    pub fn all(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        groups
    }

    pub fn count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_members_are_deduplicated_in_order() {
        let group = Group::new(
            "Trip",
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
        );
        assert_eq!(group.members, vec!["b", "a"]);
        assert!(group.has_member("a"));
    }

    #[test]
    fn test_remove_member_everywhere() {
        let mut registry = GroupRegistry::new();
        registry.upsert(Group::new("Flat", vec!["a".to_string(), "b".to_string()]));
        registry.upsert(Group::new("Trip", vec!["b".to_string(), "c".to_string()]));

        registry.remove_member_everywhere("b");

        for group in registry.all() {
            assert!(!group.has_member("b"));
        }
        assert_eq!(registry.count(), 2);
    }
}
