//! Per-category payload decoding.
//!
//! One decode function per known category.  Scalar categories (`me`,
//! `match_info`) arrive field-by-field, so their decoders fold the fields
//! present in the envelope over the previous value and the folded struct
//! replaces the slot.  Collection categories are rebuilt wholesale from
//! their nested JSON-encoded field every time.
//!
//! A decode failure never escapes this module: the previous value is
//! retained, the category is marked stale, and the failure is logged with
//! the category and a raw excerpt.

use serde_json::Value;
use tracing::{trace, warn};

use crate::error::DecodeError;
use crate::protocol::{CategoryFields, RawEnvelope};
use crate::snapshot::{
    Category, CategorySnapshot, MatchState, NormalizedSnapshot, PlayerStatus, Roster, RosterEntry,
    UnitCollection, UnitRef,
};

/// How much of a raw payload makes it into decode-failure logs.
const EXCERPT_LEN: usize = 120;

/// Applies one envelope to the snapshot and returns the categories whose
/// value changed this tick.
///
/// Categories absent from the envelope are left untouched.  Unknown
/// categories are ignored.  The tick advances exactly once per call,
/// whether or not anything changed.
pub fn apply(snapshot: &mut NormalizedSnapshot, envelope: &RawEnvelope) -> Vec<Category> {
    snapshot.advance_tick();
    let mut changed = Vec::new();

    for (name, fields) in envelope {
        let Some(category) = Category::from_feed_name(name) else {
            trace!(category = %name, "ignoring unknown category");
            continue;
        };

        match decode_category(category, snapshot.get(category), fields) {
            Ok(Some(value)) => {
                if snapshot.get(category) != Some(&value) {
                    changed.push(category);
                }
                snapshot.replace(category, value);
            }
            // Category present but carried nothing we decode; not an error.
            Ok(None) => {}
            Err(err) => {
                snapshot.mark_stale(category);
                warn!(
                    category = %category,
                    error = %err,
                    raw = %excerpt(fields),
                    "decode failed; keeping previous value",
                );
            }
        }
    }

    changed
}

fn decode_category(
    category: Category,
    prev: Option<&CategorySnapshot>,
    fields: &CategoryFields,
) -> Result<Option<CategorySnapshot>, DecodeError> {
    match category {
        Category::Me => Ok(decode_me(prev, fields)?.map(CategorySnapshot::Player)),
        Category::MatchInfo => Ok(decode_match_info(prev, fields)?.map(CategorySnapshot::Match)),
        Category::Store => Ok(decode_units("shop_pieces", fields)?.map(CategorySnapshot::Units)),
        Category::Board => Ok(decode_units("board_pieces", fields)?.map(CategorySnapshot::Units)),
        Category::Bench => Ok(decode_units("bench_pieces", fields)?.map(CategorySnapshot::Units)),
        Category::Carousel => {
            Ok(decode_units("carousel_pieces", fields)?.map(CategorySnapshot::Units))
        }
        Category::Roster => Ok(decode_roster(fields)?.map(CategorySnapshot::Roster)),
    }
}

// ── Scalar categories ─────────────────────────────────────────────────────────

fn decode_me(
    prev: Option<&CategorySnapshot>,
    fields: &CategoryFields,
) -> Result<Option<PlayerStatus>, DecodeError> {
    let mut next = match prev {
        Some(CategorySnapshot::Player(p)) => p.clone(),
        _ => PlayerStatus::default(),
    };
    let mut seen = false;

    if let Some(raw) = fields.get("gold") {
        next.gold = Some(parse_u32("gold", raw)?);
        seen = true;
    }
    if let Some(raw) = fields.get("health") {
        next.health = Some(parse_u32("health", raw)?);
        seen = true;
    }
    if let Some(raw) = fields.get("rank") {
        next.rank = Some(parse_u32("rank", raw)?);
        seen = true;
    }
    if let Some(raw) = fields.get("xp") {
        // Double-encoded: the field value is itself a JSON object, e.g.
        // `{"level":6,"xp":12}`.
        let value: Value = serde_json::from_str(raw)
            .map_err(|source| DecodeError::BadJson { field: "xp", source })?;
        if let Some(level) = value.get("level").and_then(value_as_u32) {
            next.level = Some(level);
        }
        next.xp_raw = Some(raw.clone());
        seen = true;
    }

    Ok(seen.then_some(next))
}

fn decode_match_info(
    prev: Option<&CategorySnapshot>,
    fields: &CategoryFields,
) -> Result<Option<MatchState>, DecodeError> {
    let mut next = match prev {
        Some(CategorySnapshot::Match(m)) => m.clone(),
        _ => MatchState::default(),
    };
    let mut seen = false;

    if let Some(raw) = fields.get("game_mode") {
        next.mode = Some(raw.clone());
        seen = true;
    }
    if let Some(raw) = fields.get("round_type") {
        next.round_type = Some(raw.clone());
        seen = true;
    }
    if let Some(raw) = fields.get("local_player_damage") {
        next.local_damage = Some(parse_u32("local_player_damage", raw)?);
        seen = true;
    }

    Ok(seen.then_some(next))
}

// ── Collection categories ─────────────────────────────────────────────────────

/// Decodes a `*_pieces` field into a [`UnitCollection`].
///
/// The nested JSON is either an object keyed by slot (the usual shape) or a
/// plain array.  Object iteration is key-ordered, so the resulting sequence
/// is deterministic for a given payload.
fn decode_units(
    field: &'static str,
    fields: &CategoryFields,
) -> Result<Option<UnitCollection>, DecodeError> {
    let Some(raw) = fields.get(field) else {
        return Ok(None);
    };
    let value: Value =
        serde_json::from_str(raw).map_err(|source| DecodeError::BadJson { field, source })?;

    let units = match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, unit)| unit_from_value(field, key, unit))
            .collect::<Result<Vec<_>, _>>()?,
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, unit)| unit_from_value(field, &index.to_string(), unit))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(DecodeError::UnexpectedShape { field }),
    };

    Ok(Some(UnitCollection { units }))
}

fn unit_from_value(field: &'static str, key: &str, value: &Value) -> Result<UnitRef, DecodeError> {
    match value {
        // Bare name, e.g. `{"shop_piece_1":"TFT_Aatrox"}`.
        Value::String(name) => Ok(UnitRef {
            id: key.to_string(),
            name: name.clone(),
            level: 1,
            items: Vec::new(),
        }),
        Value::Object(unit) => {
            let name = unit
                .get("name")
                .and_then(Value::as_str)
                .ok_or(DecodeError::UnexpectedShape { field })?;
            let id = unit
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(key)
                .to_string();
            let level = unit
                .get("level")
                .or_else(|| unit.get("stars"))
                .and_then(value_as_u32)
                .unwrap_or(1);
            let items = unit
                .get("items")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(item_id).collect())
                .unwrap_or_default();
            Ok(UnitRef {
                id,
                name: name.to_string(),
                level,
                items,
            })
        }
        _ => Err(DecodeError::UnexpectedShape { field }),
    }
}

fn decode_roster(fields: &CategoryFields) -> Result<Option<Roster>, DecodeError> {
    const FIELD: &str = "player_status";
    let Some(raw) = fields.get(FIELD) else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw)
        .map_err(|source| DecodeError::BadJson { field: FIELD, source })?;
    let Value::Object(players) = value else {
        return Err(DecodeError::UnexpectedShape { field: FIELD });
    };

    let entries = players
        .iter()
        .map(|(player_id, status)| RosterEntry {
            player_id: player_id.clone(),
            health: status.get("health").and_then(value_as_u32),
            rank: status.get("rank").and_then(value_as_u32),
        })
        .collect();

    Ok(Some(Roster { entries }))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_u32(field: &'static str, raw: &str) -> Result<u32, DecodeError> {
    raw.trim().parse().map_err(|_| DecodeError::NotAnInteger {
        field,
        raw: raw.to_string(),
    })
}

/// Reads an integer that the feed may deliver as a JSON number or as a
/// numeric string.
fn value_as_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .map(|n| n as u32)
        .or_else(|| value.as_str()?.trim().parse().ok())
}

/// Item ids arrive as strings or bare numbers; anything else is dropped.
fn item_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn excerpt(fields: &CategoryFields) -> String {
    let mut rendered = format!("{fields:?}");
    if rendered.len() > EXCERPT_LEN {
        let mut cut = EXCERPT_LEN;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push('…');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn envelope(category: &str, fields: &[(&str, &str)]) -> RawEnvelope {
        let mut env = RawEnvelope::new();
        env.insert(
            category.to_string(),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        env
    }

    fn player(snapshot: &NormalizedSnapshot) -> &PlayerStatus {
        match snapshot.get(Category::Me) {
            Some(CategorySnapshot::Player(p)) => p,
            other => panic!("expected player snapshot, got {other:?}"),
        }
    }

    fn board(snapshot: &NormalizedSnapshot) -> &UnitCollection {
        match snapshot.get(Category::Board) {
            Some(CategorySnapshot::Units(u)) => u,
            other => panic!("expected unit collection, got {other:?}"),
        }
    }

    // ── tick and absence ──────────────────────────────────────────────────────

    #[test]
    fn tick_advances_even_when_nothing_changes() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(&mut snapshot, &RawEnvelope::new());
        apply(&mut snapshot, &RawEnvelope::new());
        assert_eq!(snapshot.tick(), 2);
    }

    #[test]
    fn absent_category_is_left_untouched() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(&mut snapshot, &envelope("me", &[("gold", "10")]));
        let before = snapshot.get(Category::Me).cloned();

        apply(&mut snapshot, &envelope("board", &[("board_pieces", "{}")]));
        assert_eq!(snapshot.get(Category::Me).cloned(), before);
        assert!(!snapshot.is_stale(Category::Me));
    }

    #[test]
    fn unknown_category_is_ignored() {
        let mut snapshot = NormalizedSnapshot::new();
        let changed = apply(&mut snapshot, &envelope("augments", &[("slot_1", "x")]));
        assert!(changed.is_empty());
    }

    // ── scalar folding ────────────────────────────────────────────────────────

    #[test]
    fn me_fields_fold_over_previous_value() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(&mut snapshot, &envelope("me", &[("gold", "10"), ("health", "100")]));
        apply(&mut snapshot, &envelope("me", &[("gold", "15")]));

        let p = player(&snapshot);
        assert_eq!(p.gold, Some(15));
        assert_eq!(p.health, Some(100));
    }

    #[test]
    fn unchanged_scalar_value_is_not_reported_as_changed() {
        let mut snapshot = NormalizedSnapshot::new();
        let first = apply(&mut snapshot, &envelope("me", &[("gold", "10")]));
        assert_eq!(first, vec![Category::Me]);

        let second = apply(&mut snapshot, &envelope("me", &[("gold", "10")]));
        assert!(second.is_empty());

        let third = apply(&mut snapshot, &envelope("me", &[("gold", "15")]));
        assert_eq!(third, vec![Category::Me]);
    }

    #[test]
    fn me_xp_is_double_decoded_for_level() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(
            &mut snapshot,
            &envelope("me", &[("xp", r#"{"level":6,"xp":12}"#)]),
        );
        let p = player(&snapshot);
        assert_eq!(p.level, Some(6));
        assert_eq!(p.xp_raw.as_deref(), Some(r#"{"level":6,"xp":12}"#));
    }

    #[test]
    fn me_bad_gold_marks_stale_and_keeps_previous() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(&mut snapshot, &envelope("me", &[("gold", "10")]));

        let changed = apply(&mut snapshot, &envelope("me", &[("gold", "lots")]));
        assert!(changed.is_empty());
        assert!(snapshot.is_stale(Category::Me));
        assert_eq!(player(&snapshot).gold, Some(10));
    }

    #[test]
    fn stale_clears_on_next_successful_decode() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(&mut snapshot, &envelope("me", &[("gold", "nope")]));
        assert!(snapshot.is_stale(Category::Me));

        apply(&mut snapshot, &envelope("me", &[("gold", "25")]));
        assert!(!snapshot.is_stale(Category::Me));
        assert_eq!(player(&snapshot).gold, Some(25));
    }

    #[test]
    fn match_info_folds_mode_and_round() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(&mut snapshot, &envelope("match_info", &[("game_mode", "tft")]));
        apply(
            &mut snapshot,
            &envelope("match_info", &[("round_type", "PVP"), ("local_player_damage", "20")]),
        );

        let m = match snapshot.get(Category::MatchInfo) {
            Some(CategorySnapshot::Match(m)) => m,
            other => panic!("expected match state, got {other:?}"),
        };
        assert_eq!(m.mode.as_deref(), Some("tft"));
        assert_eq!(m.round_type.as_deref(), Some("PVP"));
        assert_eq!(m.local_damage, Some(20));
    }

    // ── collections ───────────────────────────────────────────────────────────

    #[test]
    fn board_pieces_decode_objects_with_items() {
        let mut snapshot = NormalizedSnapshot::new();
        let pieces = r#"{"slot_2":{"name":"Ahri","level":"2","items":["rabadons"]},"slot_1":{"name":"Aatrox","stars":1}}"#;
        apply(&mut snapshot, &envelope("board", &[("board_pieces", pieces)]));

        let units = &board(&snapshot).units;
        // Object keys iterate in sorted order.
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "slot_1");
        assert_eq!(units[0].name, "Aatrox");
        assert_eq!(units[0].level, 1);
        assert_eq!(units[1].name, "Ahri");
        assert_eq!(units[1].level, 2);
        assert_eq!(units[1].items, vec!["rabadons"]);
    }

    #[test]
    fn shop_pieces_decode_bare_name_map() {
        let mut snapshot = NormalizedSnapshot::new();
        let pieces = r#"{"shop_piece_1":"TFT_Aatrox","shop_piece_2":"TFT_Ahri"}"#;
        apply(&mut snapshot, &envelope("store", &[("shop_pieces", pieces)]));

        let units = match snapshot.get(Category::Store) {
            Some(CategorySnapshot::Units(u)) => &u.units,
            other => panic!("expected unit collection, got {other:?}"),
        };
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "TFT_Aatrox");
        assert_eq!(units[0].id, "shop_piece_1");
    }

    #[test]
    fn collection_replacement_is_wholesale() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(
            &mut snapshot,
            &envelope("bench", &[("bench_pieces", r#"{"a":"One","b":"Two"}"#)]),
        );
        apply(
            &mut snapshot,
            &envelope("bench", &[("bench_pieces", r#"{"c":"Three"}"#)]),
        );

        let units = match snapshot.get(Category::Bench) {
            Some(CategorySnapshot::Units(u)) => &u.units,
            other => panic!("expected unit collection, got {other:?}"),
        };
        // The previous two units are gone, not merged in.
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "Three");
    }

    #[test]
    fn malformed_board_json_keeps_prior_collection_and_sets_stale() {
        let mut snapshot = NormalizedSnapshot::new();
        apply(
            &mut snapshot,
            &envelope("board", &[("board_pieces", r#"{"slot_1":{"name":"Aatrox"}}"#)]),
        );
        let before = board(&snapshot).clone();

        let changed = apply(&mut snapshot, &envelope("board", &[("board_pieces", "not-json")]));
        assert!(changed.is_empty());
        assert!(snapshot.is_stale(Category::Board));
        assert_eq!(board(&snapshot), &before);
    }

    #[test]
    fn category_present_without_decodable_field_is_a_no_op() {
        let mut snapshot = NormalizedSnapshot::new();
        let changed = apply(&mut snapshot, &envelope("store", &[("unrelated", "1")]));
        assert!(changed.is_empty());
        assert!(snapshot.get(Category::Store).is_none());
        assert!(!snapshot.is_stale(Category::Store));
    }

    // ── roster ────────────────────────────────────────────────────────────────

    #[test]
    fn roster_decodes_player_status_map() {
        let mut snapshot = NormalizedSnapshot::new();
        let status = r#"{"Kai":{"health":90,"rank":2},"Lee":{"health":"45","rank":"6","xp":"ignored"}}"#;
        apply(&mut snapshot, &envelope("roster", &[("player_status", status)]));

        let roster = match snapshot.get(Category::Roster) {
            Some(CategorySnapshot::Roster(r)) => r,
            other => panic!("expected roster, got {other:?}"),
        };
        assert_eq!(roster.entries.len(), 2);
        assert_eq!(roster.entries[0].player_id, "Kai");
        assert_eq!(roster.entries[0].health, Some(90));
        assert_eq!(roster.entries[1].health, Some(45));
        assert_eq!(roster.entries[1].rank, Some(6));
    }

    #[test]
    fn roster_non_object_payload_is_a_decode_error() {
        let mut snapshot = NormalizedSnapshot::new();
        let changed = apply(&mut snapshot, &envelope("roster", &[("player_status", "[1,2]")]));
        assert!(changed.is_empty());
        assert!(snapshot.is_stale(Category::Roster));
    }

    // ── multi-category envelopes ──────────────────────────────────────────────

    #[test]
    fn one_envelope_can_change_several_categories() {
        let mut snapshot = NormalizedSnapshot::new();
        let mut env = envelope("me", &[("gold", "3")]);
        env.insert(
            "store".to_string(),
            [("shop_pieces".to_string(), r#"{"s1":"Ahri"}"#.to_string())]
                .into_iter()
                .collect(),
        );

        let changed = apply(&mut snapshot, &env);
        assert_eq!(changed, vec![Category::Me, Category::Store]);
        assert_eq!(snapshot.tick(), 1);
    }

    #[test]
    fn failure_in_one_category_does_not_block_another() {
        let mut snapshot = NormalizedSnapshot::new();
        let mut env = envelope("board", &[("board_pieces", "not-json")]);
        env.insert(
            "me".to_string(),
            [("gold".to_string(), "7".to_string())].into_iter().collect(),
        );

        let changed = apply(&mut snapshot, &env);
        assert_eq!(changed, vec![Category::Me]);
        assert!(snapshot.is_stale(Category::Board));
    }

    // ── excerpt ───────────────────────────────────────────────────────────────

    #[test]
    fn excerpt_truncates_long_payloads() {
        let mut fields = CategoryFields::new();
        fields.insert("board_pieces".to_string(), "x".repeat(500));
        let rendered = excerpt(&fields);
        assert!(rendered.chars().count() <= EXCERPT_LEN + 1);
        assert!(rendered.ends_with('…'));
    }
}
