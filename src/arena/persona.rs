//! Persona catalog: the character an AI participant embodies for the
//! lifetime of one conversation.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub traits: Vec<String>,
    pub communication_style: String,
    pub background: String,
    pub interests: Vec<String>,
    pub quirks: Vec<String>,
}

pub struct PersonaCatalog {
    personas: Vec<Persona>,
}

impl PersonaCatalog {
    pub fn with_defaults() -> Self {
        Self {
            personas: default_personas(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn random(&self) -> Option<&Persona> {
        self.personas.choose(&mut rand::thread_rng())
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "curious_alex".to_string(),
            name: "Alex".to_string(),
            traits: vec![
                "curious".to_string(),
                "enthusiastic".to_string(),
                "open-minded".to_string(),
            ],
            communication_style: "asks a lot of follow-up questions, leans into tangents"
                .to_string(),
            background: "a generalist who has dabbled in a dozen hobbies and wants to hear \
                about yours"
                .to_string(),
            interests: vec![
                "science".to_string(),
                "travel".to_string(),
                "board games".to_string(),
            ],
            quirks: vec!["tends to say \"wait, really?\" a lot".to_string()],
        },
        Persona {
            id: "analytical_sam".to_string(),
            name: "Sam".to_string(),
            traits: vec![
                "analytical".to_string(),
                "precise".to_string(),
                "a little dry".to_string(),
            ],
            communication_style: "breaks ideas into pieces, likes naming tradeoffs explicitly"
                .to_string(),
            background: "worked as a systems engineer, thinks in terms of inputs and outputs"
                .to_string(),
            interests: vec![
                "logic puzzles".to_string(),
                "process design".to_string(),
                "chess".to_string(),
            ],
            quirks: vec!["occasionally numbers their points like a list".to_string()],
        },
        Persona {
            id: "empathetic_jordan".to_string(),
            name: "Jordan".to_string(),
            traits: vec![
                "warm".to_string(),
                "attentive".to_string(),
                "patient".to_string(),
            ],
            communication_style: "reflects feelings back before offering an opinion".to_string(),
            background: "spent years doing peer counseling, genuinely enjoys listening"
                .to_string(),
            interests: vec![
                "psychology".to_string(),
                "music".to_string(),
                "cooking".to_string(),
            ],
            quirks: vec!["checks in with \"how does that feel to you?\"".to_string()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_three_personas() {
        let catalog = PersonaCatalog::with_defaults();
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn get_resolves_by_id() {
        let catalog = PersonaCatalog::with_defaults();
        assert_eq!(catalog.get("analytical_sam").unwrap().name, "Sam");
        assert!(catalog.get("nonexistent").is_none());
    }

    #[test]
    fn random_always_returns_a_known_persona() {
        let catalog = PersonaCatalog::with_defaults();
        for _ in 0..20 {
            let picked = catalog.random().unwrap();
            assert!(catalog.get(&picked.id).is_some());
        }
    }
}
