//! Graphviz DOT export of a definition.
//!
//! <https://en.wikipedia.org/wiki/DOT_(graph_description_language)>
//!
//! Any valid definition renders, including bypass routing nodes and
//! multi-destination events (one edge per distinct destination, routed
//! destinations labeled `name:result`).

use crate::definition::Definition;
use crate::state::StateType;
use std::fmt::Write;

/// Escapes a label for use inside a double-quoted DOT string.
pub fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_attributes(kind: StateType) -> &'static str {
    match kind {
        StateType::Start => "shape=doublecircle,color=\".7 .3 1.0\"",
        StateType::End => "shape=circle,color=red",
        StateType::Bypass | StateType::Custom => "shape=box",
    }
}

/// Renders the definition as a Graphviz digraph.
pub fn serialize(def: &Definition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", escape(&def.name));
    let _ = writeln!(out, "  size =\"4,4\";");

    for node in def.states() {
        let _ = writeln!(
            out,
            "  {} [label=\"{}\",{}];",
            node.key,
            escape(&node.name),
            node_attributes(node.kind)
        );
    }

    for edge in def.events() {
        let _ = writeln!(
            out,
            "  {} -> {} [label=\"{}\"];",
            edge.from,
            edge.to,
            escape(&edge.name)
        );
        for (result, dest) in &edge.routes {
            if dest != &edge.to {
                let _ = writeln!(
                    out,
                    "  {} -> {} [label=\"{}:{}\"];",
                    edge.from,
                    dest,
                    escape(&edge.name),
                    escape(result.as_str())
                );
            }
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionBuilder;
    use crate::state::StateType;

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a\"b"), "a\\\"b");
        assert_eq!(escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_serialize_review() {
        let def = DefinitionBuilder::new("review")
            .state("draft", StateType::Start)
            .state("reviewing", StateType::Custom)
            .state("reviewed", StateType::End)
            .event("submit", "draft", "reviewing")
            .event("agree", "reviewing", "reviewed")
            .build()
            .unwrap();
        let dot = serialize(&def);
        assert!(dot.starts_with("digraph review {"));
        assert!(dot.contains("draft [label=\"draft\",shape=doublecircle,color=\".7 .3 1.0\"];"));
        assert!(dot.contains("reviewed [label=\"reviewed\",shape=circle,color=red];"));
        assert!(dot.contains("reviewing [label=\"reviewing\",shape=box];"));
        assert!(dot.contains("draft -> reviewing [label=\"submit\"];"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_serialize_multi_result_and_bypass() {
        let def = DefinitionBuilder::new("triage")
            .state("incoming", StateType::Start)
            .state("relay", StateType::Bypass)
            .state("accepted", StateType::End)
            .state("refused", StateType::End)
            .event("decide", "incoming", "relay")
            .results(["ok", "deny"])
            .route("deny", "refused")
            .event("emit", "relay", "accepted")
            .build()
            .unwrap();
        let dot = serialize(&def);
        assert!(dot.contains("relay [label=\"relay\",shape=box];"));
        assert!(dot.contains("incoming -> relay [label=\"decide\"];"));
        assert!(dot.contains("incoming -> refused [label=\"decide:deny\"];"));
    }
}
