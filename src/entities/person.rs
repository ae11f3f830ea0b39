// 👤 Person Entity - identity by id, display name as value
//
// Balances, payers, participants and transactions all reference people by
// id. A person that is missing from the registry is not an error: lookups
// return `None` and display falls back to the raw id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Person identifier (stable, never reused)
pub type PersonId = String;

/// Id of the person operating the app
pub const CURRENT_USER_ID: &str = "current_user";

// ============================================================================
// PERSON ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    /// Stable identity - NEVER changes
    pub id: PersonId,

    /// Display name
    pub name: String,

    /// Is this person using the app themselves?
    #[serde(default)]
    pub is_app_user: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Who added this contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<PersonId>,
}

impl Person {
    /// Create a new contact with a fresh UUID
    pub fn new(name: &str) -> Self {
        Self::with_id(&uuid::Uuid::new_v4().to_string(), name)
    }

    /// Create a person with a known id (imports, fixtures)
    pub fn with_id(id: &str, name: &str) -> Self {
        Person {
            id: id.to_string(),
            name: name.to_string(),
            is_app_user: false,
            phone_number: None,
            email: None,
            added_by: None,
        }
    }

    /// The "Me" person every book starts with
    pub fn current_user() -> Self {
        Person {
            is_app_user: true,
            ..Person::with_id(CURRENT_USER_ID, "Me")
        }
    }

    pub fn is_current_user(&self) -> bool {
        self.id == CURRENT_USER_ID
    }
}

impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Person {}

impl Hash for Person {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ============================================================================
// PERSON REGISTRY (friends list)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonRegistry {
    people: BTreeMap<PersonId, Person>,
}

impl PersonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the current user
    pub fn with_current_user() -> Self {
        let mut registry = Self::new();
        registry.upsert(Person::current_user());
        registry
    }

    /// Insert or replace by id
    pub fn upsert(&mut self, person: Person) {
        self.people.insert(person.id.clone(), person);
    }

    /// Apply an edit to an existing person. Returns `false` if unknown.
    pub fn update<F>(&mut self, id: &str, update_fn: F) -> bool
    where
        F: FnOnce(&mut Person),
    {
        match self.people.get_mut(id) {
            Some(person) => {
                update_fn(person);
                true
            }
            None => false,
        }
    }

    /// Flag a contact as an app user, optionally filling in contact details
    pub fn mark_as_app_user(
        &mut self,
        id: &str,
        phone_number: Option<String>,
        email: Option<String>,
    ) -> bool {
        self.update(id, |person| {
            person.is_app_user = true;
            if phone_number.is_some() {
                person.phone_number = phone_number;
            }
            if email.is_some() {
                person.email = email;
            }
        })
    }

    pub fn remove(&mut self, id: &str) -> Option<Person> {
        self.people.remove(id)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Person> {
        self.people.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.people.contains_key(id)
    }

    /// Name for display; unknown ids display as themselves
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.people
            .get(id)
            .map(|person| person.name.as_str())
            .unwrap_or(id)
    }

    /// All people sorted by name (then id)
    pub fn all(&self) -> Vec<Person> {
        let mut people: Vec<Person> = self.people.values().cloned().collect();
        people.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        people
    }

    /// Everyone except the current user
    pub fn friends(&self) -> Vec<Person> {
        self.all()
            .into_iter()
            .filter(|person| !person.is_current_user())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.people.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_person_identity_is_id() {
        let a = Person::with_id("p1", "Alice");
        let renamed = Person::with_id("p1", "Alice Smith");
        let other = Person::with_id("p2", "Alice");

        assert_eq!(a, renamed);
        assert_ne!(a, other);

        let set: HashSet<Person> = vec![a, renamed, other].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_new_person_gets_uuid() {
        let person = Person::new("Bob");
        assert_eq!(person.id.len(), 36);
        assert!(!person.is_app_user);
    }

    #[test]
    fn test_registry_display_name_falls_back_to_id() {
        let mut registry = PersonRegistry::with_current_user();
        registry.upsert(Person::with_id("p1", "Alice"));

        assert_eq!(registry.display_name("p1"), "Alice");
        assert_eq!(registry.display_name(CURRENT_USER_ID), "Me");
        assert_eq!(registry.display_name("deleted"), "deleted");
    }

    #[test]
    fn test_registry_update_and_mark_app_user() {
        let mut registry = PersonRegistry::new();
        registry.upsert(Person::with_id("p1", "Alice"));

        assert!(registry.update("p1", |p| p.name = "Alicia".to_string()));
        assert!(!registry.update("missing", |p| p.name = "X".to_string()));

        assert!(registry.mark_as_app_user("p1", None, Some("a@example.com".to_string())));
        let alice = registry.find_by_id("p1").unwrap();
        assert_eq!(alice.name, "Alicia");
        assert!(alice.is_app_user);
        assert_eq!(alice.email.as_deref(), Some("a@example.com"));
        assert_eq!(alice.phone_number, None);
    }

    #[test]
    fn test_friends_excludes_current_user() {
        let mut registry = PersonRegistry::with_current_user();
        registry.upsert(Person::with_id("p2", "Zed"));
        registry.upsert(Person::with_id("p1", "Bob"));

        let friends = registry.friends();
        let names: Vec<&str> = friends.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bob", "Zed"]);
        assert_eq!(registry.count(), 3);
    }
}
