//! Visualiser-ready export of the graph.

use clinigraph_common::{Entity, EntityContext, Relation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub size: f64,
    pub color: String,
    pub confidence: f64,
    pub aliases: Vec<String>,
    pub context: EntityContext,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendEdge {
    pub from_node: String,
    pub to_node: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontendGraph {
    pub nodes: Vec<FrontendNode>,
    pub edges: Vec<FrontendEdge>,
}

impl FrontendGraph {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Nodes come out sorted by id and edges by (from, to, type).
pub fn export_frontend_graph(entities: &[Entity], relations: &[Relation]) -> FrontendGraph {
    let mut nodes: Vec<FrontendNode> = entities
        .iter()
        .map(|e| FrontendNode {
            id: e.canonical_name.clone(),
            node_type: e.entity_type.as_str().to_string(),
            size: e.visual_size,
            color: e.color.clone(),
            confidence: e.confidence,
            aliases: e.aliases.clone(),
            context: e.context.clone(),
            summary: e.summary.clone(),
        })
        .collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut edges: Vec<FrontendEdge> = relations
        .iter()
        .map(|r| FrontendEdge {
            from_node: r.from_entity.clone(),
            to_node: r.to_entity.clone(),
            edge_type: r.relation_type.clone(),
            confidence: r.confidence,
        })
        .collect();
    edges.sort_by(|a, b| {
        (&a.from_node, &a.to_node, &a.edge_type).cmp(&(&b.from_node, &b.to_node, &b.edge_type))
    });

    FrontendGraph { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinigraph_common::EntityType;

    #[test]
    fn test_export_is_sorted_and_typed() {
        let entities = vec![
            Entity::new("stress", EntityType::Trigger),
            Entity::new("headache", EntityType::Symptom),
        ];
        let relations = vec![Relation {
            from_entity: "stress".into(),
            to_entity: "headache".into(),
            relation_type: "causes".into(),
            confidence: 0.5,
            last_seen: Utc::now(),
        }];
        let graph = export_frontend_graph(&entities, &relations);
        assert_eq!(graph.nodes[0].id, "headache");
        assert_eq!(graph.nodes[0].color, "#ff6666");

        let json: serde_json::Value =
            serde_json::from_str(&graph.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["nodes"][1]["type"], "Trigger");
        assert_eq!(json["edges"][0]["from_node"], "stress");
        assert_eq!(json["edges"][0]["type"], "causes");
    }
}
