use parley_plugin::message::{Link, Node, NodeKind, StructureSnapshot};

/// A small guard/merchant conversation shown when the host cannot hand over
/// the real structure, so the panel still demonstrates every node style.
pub fn demo_snapshot() -> StructureSnapshot {
    let action = |mut n: Node, script: &str| {
        n.has_action = true;
        n.action_script = Some(script.to_string());
        n
    };

    let mut quest_link = Node::new("link_1", NodeKind::Link, "-> Quest Accepted");
    quest_link.is_link = true;
    quest_link.link_target = Some("npc_2".into());
    quest_link.has_condition = true;
    quest_link.condition_script = Some("gc_has_item".into());

    let nodes = vec![
        Node::new("root", NodeKind::Root, "Dialog Start"),
        Node::new("npc_1", NodeKind::Npc, "Hello, traveler!").with_speaker("Guard"),
        Node::new("pc_1", NodeKind::Pc, "Greetings."),
        Node::new("pc_2", NodeKind::Pc, "What do you want?"),
        action(Node::new("pc_3", NodeKind::Pc, "[Leave]"), "nw_walk_wp"),
        action(Node::new("npc_2", NodeKind::Npc, "I have a quest for you.").with_speaker("Guard"), "sc_start_quest"),
        Node::new("npc_3", NodeKind::Npc, "No need to be rude!").with_speaker("Guard"),
        Node::new("pc_4", NodeKind::Pc, "Tell me more."),
        Node::new("pc_5", NodeKind::Pc, "Not interested."),
        Node::new("npc_4", NodeKind::Npc, "There's a cave nearby...").with_speaker("Merchant"),
        quest_link,
    ];

    let mut skill_check = Link::new("npc_2", "pc_4");
    skill_check.has_condition = true;
    skill_check.condition_script = Some("gc_check_skill".into());

    let links = vec![
        Link::new("root", "npc_1"),
        Link::new("npc_1", "pc_1"),
        Link::new("npc_1", "pc_2"),
        Link::new("npc_1", "pc_3"),
        Link::new("pc_1", "npc_2"),
        Link::new("pc_2", "npc_3"),
        skill_check,
        Link::new("npc_2", "pc_5"),
        Link::new("pc_4", "npc_4"),
        Link::new("npc_4", "link_1"),
    ];

    StructureSnapshot { nodes, links }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_link_points_at_a_demo_node() {
        let demo = demo_snapshot();
        let ids: HashSet<&str> = demo.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), demo.nodes.len());
        for link in &demo.links {
            assert!(ids.contains(link.source.as_str()), "{}", link.source);
            assert!(ids.contains(link.target.as_str()), "{}", link.target);
        }
    }

    #[test]
    fn alias_node_targets_existing_node() {
        let demo = demo_snapshot();
        let alias = demo.nodes.iter().find(|n| n.is_link).unwrap();
        assert_eq!(alias.link_target.as_deref(), Some("npc_2"));
        assert!(demo.nodes.iter().any(|n| n.id == "npc_2"));
    }
}
