//! Chunk assembly for synthesis requests
//!
//! A chunk is a run of consecutive units joined with blank lines, sized so a
//! single synthesis request stays responsive. Dense scripts pack far more
//! meaning per codepoint, so a chunk that starts on CJK text gets a smaller
//! target than one starting on Latin text.

use crate::message::UnitId;
use crate::page::scan::TextUnit;
use crate::{ReadifyError, Result};
use log::debug;

/// Target chunk size when the starting unit contains CJK text
pub const CJK_TARGET: usize = 200;
/// Target chunk size otherwise
pub const DEFAULT_TARGET: usize = 450;

/// Separator between units inside a chunk, counted as 2 codepoints
const SEPARATOR: &str = "\n\n";

/// A batch of consecutive units prepared for one synthesis request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Joined unit texts, separated by blank lines
    pub text: String,
    /// Ids of every unit included, in order
    pub unit_ids: Vec<UnitId>,
    /// Id of the last included unit
    pub last_unit_id: UnitId,
}

/// Count text length in Unicode codepoints, not bytes
pub fn character_count(text: &str) -> usize {
    text.chars().count()
}

/// Is this codepoint in one of the CJK ranges we size chunks by?
fn is_cjk_char(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF   // Hiragana and Katakana
        | 0x3400..=0x4DBF // CJK extension A
        | 0x4E00..=0x9FFF // CJK unified ideographs
        | 0xF900..=0xFAFF // CJK compatibility ideographs
        | 0xAC00..=0xD7AF // Hangul syllables
        | 0xFF00..=0xFFEF // Halfwidth and fullwidth forms
    )
}

/// Does the text contain any CJK codepoints? Even a few embedded ideographs
/// pull the budget down, a single range test decides.
pub fn is_cjk(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

/// Chunk size target for a chunk starting on this text
pub fn target_length(start_text: &str) -> usize {
    if is_cjk(start_text) {
        CJK_TARGET
    } else {
        DEFAULT_TARGET
    }
}

/// Build a chunk starting at `start_id`.
///
/// Walks forward from the starting unit, appending whole units and stopping
/// as soon as the running total (including the 2-codepoint separators)
/// reaches the target. Units are never split: the unit that crosses the
/// target is still included whole, and a single oversized starting unit is
/// returned alone.
pub fn build_chunk(units: &[TextUnit], start_id: &str) -> Result<Chunk> {
    let start = units
        .iter()
        .position(|u| u.id == start_id)
        .ok_or_else(|| ReadifyError::NotFound(format!("Unknown unit id: {}", start_id)))?;

    let target = target_length(&units[start].text);
    let mut text = units[start].text.clone();
    let mut total = units[start].chars;
    let mut unit_ids = vec![units[start].id.clone()];

    if total < target {
        for unit in &units[start + 1..] {
            text.push_str(SEPARATOR);
            text.push_str(&unit.text);
            total += SEPARATOR.chars().count() + unit.chars;
            unit_ids.push(unit.id.clone());
            if total >= target {
                break;
            }
        }
    }

    let last_unit_id = unit_ids
        .last()
        .cloned()
        .unwrap_or_else(|| start_id.to_string());
    debug!(
        "Built chunk of {} units, {} chars (target {})",
        unit_ids.len(),
        total,
        target
    );

    Ok(Chunk {
        text,
        unit_ids,
        last_unit_id,
    })
}
