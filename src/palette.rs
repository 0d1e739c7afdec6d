//! Speaker colours for the flowchart.
//!
//! The host knows the colours the user picked for the tree view; when it
//! cannot tell us we derive a stable set locally.

use std::collections::{BTreeMap, BTreeSet};

use parley_plugin::HostClient;
use parley_plugin::message::{Node, NodeKind, SpeakerColors};
use tracing::warn;

/// Speaker name (or one of the reserved `_pc` / `_owner` keys) to CSS colour.
pub type ColorMap = BTreeMap<String, String>;

pub const PC_KEY: &str = "_pc";
pub const OWNER_KEY: &str = "_owner";

pub const DEFAULT_PC_COLOR: &str = "#4FC3F7";
pub const DEFAULT_OWNER_COLOR: &str = "#FF8A65";

/// Assigned to NPC speakers in name order before falling back to hashed hues.
pub const NPC_PALETTE: [&str; 6] = ["#BA68C8", "#26A69A", "#FFD54F", "#F48FB1", "#8e4585", "#5a4d2d"];

/// Ask the host first, fall back to [`fallback`] on any error.
pub async fn resolve(host: &dyn HostClient, nodes: &[Node]) -> ColorMap {
    match host.get_speaker_colors().await {
        Ok(colors) => from_host(colors),
        Err(e) => {
            warn!("speaker colors unavailable, using local palette: {e}");
            fallback(nodes)
        }
    }
}

pub fn from_host(colors: SpeakerColors) -> ColorMap {
    let mut map = ColorMap::new();
    map.insert(PC_KEY.into(), or_default(colors.pc_color, DEFAULT_PC_COLOR));
    map.insert(OWNER_KEY.into(), or_default(colors.owner_color, DEFAULT_OWNER_COLOR));
    map.extend(colors.speaker_colors);
    map
}

pub fn fallback(nodes: &[Node]) -> ColorMap {
    let mut map = ColorMap::new();
    map.insert(PC_KEY.into(), DEFAULT_PC_COLOR.into());
    map.insert(OWNER_KEY.into(), DEFAULT_OWNER_COLOR.into());

    let speakers: BTreeSet<&str> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Npc)
        .filter_map(|n| n.speaker.as_deref())
        .filter(|s| !s.is_empty())
        .collect();

    for (i, speaker) in speakers.into_iter().enumerate() {
        let color = match NPC_PALETTE.get(i) {
            Some(c) => (*c).to_string(),
            None => overflow_color(speaker),
        };
        map.insert(speaker.to_string(), color);
    }
    map
}

/// Hue from the sum of the name's code points.
pub fn overflow_color(speaker: &str) -> String {
    let sum: u64 = speaker.chars().map(|c| c as u64).sum();
    format!("hsl({}, 50%, 35%)", sum % 360)
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() { default.to_string() } else { value }
}
