// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic pattern resolution.
//!
//! A topic is resolved in two steps: its first segment selects the node,
//! then the node's own pattern extracts the measurement name and tags.
//!
//! ```text
//! kitchen/temperature/room1
//! ^^^^^^^                     node lookup (exact, case-sensitive)
//! (?P<node_name>kitchen)/(?P<measurement_name>token_pattern)/(?P<room>token_pattern)
//!                        measurement = "temperature", tags = {room: "room1"}
//! ```

use crate::config::NodeConfig;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use thiserror::Error;

/// Characters allowed in a single topic segment.
pub const TOKEN_PATTERN: &str = r"(?:\w|-|\.)+";

/// Placeholder inside node patterns replaced by [`TOKEN_PATTERN`].
pub const TOKEN_PLACEHOLDER: &str = "token_pattern";

/// Capture group holding the measurement name.
pub const MEASUREMENT_GROUP: &str = "measurement_name";

/// Capture group holding the node name. Never emitted as a tag.
pub const NODE_GROUP: &str = "node_name";

/// Per-message resolution failures. All of them drop the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("could not extract node name from topic '{0}'")]
    MalformedTopic(String),

    #[error("node '{node}' extracted from topic '{topic}' is not configured")]
    UnknownNode { node: String, topic: String },

    #[error("could not extract measurement name from topic '{0}'")]
    MeasurementExtractionFailed(String),
}

/// Node pattern compilation errors, raised at startup.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("node '{node}': invalid pattern: {source}")]
    Regex {
        node: String,
        #[source]
        source: regex::Error,
    },

    #[error("node '{0}': pattern has no (?P<measurement_name>...) group")]
    MissingMeasurementGroup(String),

    #[error("node '{0}' is configured more than once")]
    DuplicateNode(String),
}

/// Identity extracted from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTopic {
    pub node_name: String,
    pub measurement_name: String,
    /// Every other named group that took part in the match.
    pub tags: BTreeMap<String, String>,
}

/// Compiled pattern of one node.
#[derive(Debug, Clone)]
pub struct NodePattern {
    name: String,
    regex: Regex,
    tag_groups: Vec<String>,
}

impl NodePattern {
    /// Compile a node's pattern template.
    ///
    /// The placeholder is substituted, the result is anchored at the start of
    /// the topic only, and the measurement group is required.
    pub fn compile(node: &NodeConfig) -> Result<Self, PatternError> {
        let source = format!("^(?:{})", expand_template(&node.regex));
        let regex = Regex::new(&source).map_err(|source| PatternError::Regex {
            node: node.name.clone(),
            source,
        })?;

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        if !names.contains(&MEASUREMENT_GROUP) {
            return Err(PatternError::MissingMeasurementGroup(node.name.clone()));
        }

        let tag_groups = names
            .into_iter()
            .filter(|n| *n != MEASUREMENT_GROUP && *n != NODE_GROUP)
            .map(str::to_string)
            .collect();

        Ok(Self {
            name: node.name.clone(),
            regex,
            tag_groups,
        })
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Named groups that become tags.
    pub fn tag_groups(&self) -> &[String] {
        &self.tag_groups
    }

    /// Extract measurement name and tags from a full topic.
    pub fn extract(&self, topic: &str) -> Option<(String, BTreeMap<String, String>)> {
        let caps = self.regex.captures(topic)?;
        let measurement = caps.name(MEASUREMENT_GROUP)?.as_str().to_string();

        let tags = self
            .tag_groups
            .iter()
            .filter_map(|group| {
                caps.name(group)
                    .map(|m| (group.clone(), m.as_str().to_string()))
            })
            .collect();

        Some((measurement, tags))
    }
}

/// Substitute the token placeholder in a node pattern template.
pub fn expand_template(template: &str) -> String {
    template.replace(TOKEN_PLACEHOLDER, TOKEN_PATTERN)
}

/// Check that a string is a single topic token.
pub fn is_token(s: &str) -> bool {
    node_regex()
        .captures(s)
        .and_then(|c| c.name(NODE_GROUP))
        .map(|m| m.as_str().len() == s.len())
        .unwrap_or(false)
}

fn node_regex() -> &'static Regex {
    static NODE_REGEX: OnceLock<Regex> = OnceLock::new();
    NODE_REGEX.get_or_init(|| {
        Regex::new(&format!("^(?P<{}>{})/?", NODE_GROUP, TOKEN_PATTERN))
            .unwrap_or_else(|e| unreachable!("token pattern is a valid regex: {e}"))
    })
}

/// Resolves topics against the configured node table.
#[derive(Debug, Clone)]
pub struct PatternResolver {
    nodes: HashMap<String, NodePattern>,
    order: Vec<String>,
}

impl PatternResolver {
    /// Compile every node pattern.
    pub fn new(nodes: &[NodeConfig]) -> Result<Self, PatternError> {
        let mut table = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());

        for node in nodes {
            let pattern = NodePattern::compile(node)?;
            if table.insert(node.name.clone(), pattern).is_some() {
                return Err(PatternError::DuplicateNode(node.name.clone()));
            }
            order.push(node.name.clone());
        }

        Ok(Self {
            nodes: table,
            order,
        })
    }

    /// Resolve a topic to its node, measurement and tags.
    pub fn resolve(&self, topic: &str) -> Result<ResolvedTopic, ResolveError> {
        let node_name = node_regex()
            .captures(topic)
            .and_then(|c| c.name(NODE_GROUP))
            .map(|m| m.as_str())
            .ok_or_else(|| ResolveError::MalformedTopic(topic.to_string()))?;

        let node = self
            .nodes
            .get(node_name)
            .ok_or_else(|| ResolveError::UnknownNode {
                node: node_name.to_string(),
                topic: topic.to_string(),
            })?;

        let (measurement_name, tags) = node
            .extract(topic)
            .ok_or_else(|| ResolveError::MeasurementExtractionFailed(topic.to_string()))?;

        Ok(ResolvedTopic {
            node_name: node.name.clone(),
            measurement_name,
            tags,
        })
    }

    /// Node names in configuration order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Get the compiled pattern of a node.
    pub fn node(&self, name: &str) -> Option<&NodePattern> {
        self.nodes.get(name)
    }

    /// Wildcard subscriptions covering every node (`{node}/#`).
    pub fn subscriptions(&self) -> Vec<String> {
        self.node_names().map(|n| format!("{}/#", n)).collect()
    }

    /// Number of configured nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if no node is configured.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
