//! Unit aggregation
//!
//! The aggregator turns a parsed document into the flat, ordered list of
//! speakable units the rest of the pipeline works in. Units keep their ids
//! across rescans of the same page wherever the text survives, so playback
//! state attached to a unit is not lost when the page mutates around it.

use crate::message::UnitId;
use crate::page::chunk::character_count;
use crate::page::document::{BlockKind, Document};
use log::debug;
use std::collections::HashMap;

/// Units shorter than this (in codepoints) are noise, not content
pub const MIN_UNIT_CHARS: usize = 10;

/// What kind of block a unit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Paragraph,
    List,
}

impl UnitKind {
    pub fn name(self) -> &'static str {
        match self {
            UnitKind::Paragraph => "paragraph",
            UnitKind::List => "list",
        }
    }
}

/// One speakable unit of page text
#[derive(Debug, Clone)]
pub struct TextUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub text: String,
    /// Codepoint count of `text`, precomputed for chunk sizing
    pub chars: usize,
}

/// Scans documents into units and keeps ids stable across rescans
#[derive(Debug, Default)]
pub struct Aggregator {
    units: Vec<TextUnit>,
    next_id: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rescan a document, reusing ids for units whose text is unchanged.
    ///
    /// Identity is (text, occurrence index): the second "Read more" on the
    /// new page maps to the second "Read more" on the old one. Units with no
    /// match get fresh ids; units that disappeared are dropped along with
    /// any state keyed on them.
    ///
    /// Returns the number of units found.
    pub fn rescan(&mut self, doc: &Document) -> usize {
        let mut previous: HashMap<(String, usize), UnitId> = HashMap::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for unit in &self.units {
            let occurrence = seen.entry(unit.text.clone()).or_insert(0);
            previous.insert((unit.text.clone(), *occurrence), unit.id.clone());
            *occurrence += 1;
        }

        let mut units = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for block in doc.blocks() {
            let chars = character_count(&block.text);
            if chars < MIN_UNIT_CHARS {
                continue;
            }
            let occurrence = counts.entry(block.text.clone()).or_insert(0);
            let id = match previous.get(&(block.text.clone(), *occurrence)) {
                Some(id) => id.clone(),
                None => {
                    self.next_id += 1;
                    format!("u{}", self.next_id)
                }
            };
            *occurrence += 1;

            units.push(TextUnit {
                id,
                kind: match block.kind {
                    BlockKind::Paragraph => UnitKind::Paragraph,
                    BlockKind::OrderedList | BlockKind::UnorderedList => UnitKind::List,
                },
                text: block.text.clone(),
                chars,
            });
        }

        debug!("Rescan found {} units", units.len());
        self.units = units;
        self.units.len()
    }

    /// All current units in document order
    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    /// Look up a unit by id
    pub fn get(&self, id: &str) -> Option<&TextUnit> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Position of a unit in document order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.units.iter().position(|u| u.id == id)
    }

    /// The unit after `id` in document order, if any
    pub fn next_after(&self, id: &str) -> Option<&TextUnit> {
        self.position(id).and_then(|i| self.units.get(i + 1))
    }
}
