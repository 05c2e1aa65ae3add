//! Named value generators for anonymised columns.
//!
//! Generators are looked up by exact name. A name that is not registered is
//! not an error: the anonymiser leaves such a column untouched.

use std::collections::HashMap;

use fake::faker::address::en::{CityName, CountryName, StateName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{Password, SafeEmail, Username, IPv4, IPv6};
use fake::faker::job::en::Title;
use fake::faker::lorem::en::{Paragraph, Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use uuid::Uuid;

use crate::core::value::Value;

/// A value generator. Called once per row.
pub type GeneratorFn = fn() -> Value;

/// Registry of value generators keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Generators {
    by_name: HashMap<String, GeneratorFn>,
}

impl Generators {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in generators.
    pub fn with_builtins() -> Self {
        let mut generators = Self::new();
        generators.register("FirstName", || text(FirstName().fake()));
        generators.register("LastName", || text(LastName().fake()));
        generators.register("FullName", || text(Name().fake()));
        generators.register("EmailAddress", || text(SafeEmail().fake()));
        generators.register("UserName", || text(Username().fake()));
        generators.register("Password", || text(Password(12..20).fake()));
        generators.register("Phone", || text(PhoneNumber().fake()));
        generators.register("Street", || text(StreetName().fake()));
        generators.register("City", || text(CityName().fake()));
        generators.register("State", || text(StateName().fake()));
        generators.register("Zip", || text(ZipCode().fake()));
        generators.register("Country", || text(CountryName().fake()));
        generators.register("Company", || text(CompanyName().fake()));
        generators.register("JobTitle", || text(Title().fake()));
        generators.register("IPv4", || text(IPv4().fake()));
        generators.register("IPv6", || text(IPv6().fake()));
        generators.register("Word", || text(Word().fake()));
        generators.register("Sentence", || text(Sentence(4..10).fake()));
        generators.register("Paragraph", || text(Paragraph(2..4).fake()));
        generators.register("UUID", || Value::Text(Uuid::new_v4().to_string()));
        generators
    }

    /// Register or replace a generator.
    pub fn register(&mut self, name: impl Into<String>, generator: GeneratorFn) {
        self.by_name.insert(name.into(), generator);
    }

    /// Look up a generator by exact name.
    pub fn get(&self, name: &str) -> Option<GeneratorFn> {
        self.by_name.get(name).copied()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn text(s: String) -> Value {
    Value::Text(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(name: &str) -> String {
        let generator = Generators::with_builtins().get(name).unwrap();
        match generator() {
            Value::Text(s) => s,
            other => panic!("{} produced {:?}", name, other),
        }
    }

    #[test]
    fn test_email_has_at_sign() {
        let email = generate("EmailAddress");
        assert!(email.contains('@'), "{}", email);
    }

    #[test]
    fn test_uuid_parses() {
        assert!(Uuid::parse_str(&generate("UUID")).is_ok());
    }

    #[test]
    fn test_ipv4_has_four_octets() {
        assert_eq!(generate("IPv4").split('.').count(), 4);
    }

    #[test]
    fn test_every_builtin_produces_text() {
        let generators = Generators::with_builtins();
        for name in generators.names() {
            let value = (generators.get(name).unwrap())();
            assert!(matches!(value, Value::Text(ref s) if !s.is_empty()), "{}", name);
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        let generators = Generators::with_builtins();
        assert!(generators.get("FirstName").is_some());
        assert!(generators.get("firstname").is_none());
        assert!(generators.get("NoSuchThing").is_none());
    }

    #[test]
    fn test_register_overrides() {
        let mut generators = Generators::with_builtins();
        generators.register("Word", || Value::Text("fixed".to_string()));
        assert_eq!((generators.get("Word").unwrap())(), Value::Text("fixed".to_string()));
    }
}
