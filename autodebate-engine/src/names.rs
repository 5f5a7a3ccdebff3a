//! Unique participant names.

use std::collections::HashSet;

use rand::seq::SliceRandom;

const NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "David", "Eve", "Frank", "Grace", "Henry", "Iris", "Jack", "Karen",
    "Leo", "Maya", "Nora", "Oscar", "Paula", "Quinn", "Rita", "Sam", "Tara", "Uma", "Victor",
    "Wendy", "Xavier", "Yara", "Zoe",
];

/// Pick a random name not in `used`, falling back to `ParticipantN`.
pub fn generate_name(used: &HashSet<String>) -> String {
    let available: Vec<&str> = NAMES
        .iter()
        .copied()
        .filter(|n| !used.contains(*n))
        .collect();
    if let Some(name) = available.choose(&mut rand::thread_rng()) {
        return name.to_string();
    }
    (1..)
        .map(|i| format!("Participant{i}"))
        .find(|n| !used.contains(n))
        .unwrap_or_default()
}

/// Hands out names that are unique within one session.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> String {
        let name = generate_name(&self.used);
        self.used.insert(name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_come_from_the_list() {
        let name = generate_name(&HashSet::new());
        assert!(NAMES.contains(&name.as_str()));
    }

    #[test]
    fn exhausted_list_falls_back_to_numbered_names() {
        let mut used: HashSet<String> = NAMES.iter().map(|n| n.to_string()).collect();
        assert_eq!(generate_name(&used), "Participant1");
        used.insert("Participant1".into());
        assert_eq!(generate_name(&used), "Participant2");
    }

    #[test]
    fn registry_never_repeats() {
        let mut reg = NameRegistry::new();
        let names: HashSet<String> = (0..40).map(|_| reg.next()).collect();
        assert_eq!(names.len(), 40);
    }
}
