// Topology marshaller - link records to the node/edge/combo graph drawn by the UI
use crate::domain::liveness::{Liveness, NodeStyle};
use indexmap::IndexSet;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Suffix carried by the path segment of a bin (compound element).
pub const BIN_SUFFIX: &str = " bin";

/// Endpoint name used when a link starts or ends on the enclosing bin itself.
pub const BIN_ITSELF: &str = "bin-itself";

const PATH_SEPARATOR: &str = "/";

/// One connection between two endpoints inside the scope `parent_path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    pub parent_path: String,
    pub from: String,
    pub to: String,
    pub pad_from: String,
    pub pad_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(rename = "comboId")]
    pub combo_id: String,
    pub is_bin: bool,
    pub path: Vec<String>,
    pub style: NodeStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Combo {
    pub id: String,
    pub label: String,
    #[serde(rename = "parentId")]
    pub parent_id: Option<String>,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopologyGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub combos: Vec<Combo>,
}

/// Lowercase hex MD5. Ids are kept stable across runs, clients may cache them.
fn digest(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

fn join(path: &[String]) -> String {
    path.join(PATH_SEPARATOR)
}

/// Node before the styling pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Endpoint {
    id: String,
    label: String,
    combo_id: String,
    is_bin: bool,
    path: Vec<String>,
}

impl Endpoint {
    fn new(path: Vec<String>, label: String, is_bin: bool) -> Self {
        let joined = join(&path);
        Self {
            id: digest(&format!("{joined}{label}")),
            combo_id: digest(&joined),
            label,
            is_bin,
            path,
        }
    }

    /// Path tracked by liveness: a bin endpoint drops its own `" bin"` segment.
    fn liveness_path(&self) -> String {
        if self.is_bin {
            join(&self.path[..self.path.len().saturating_sub(1)])
        } else {
            join(&self.path)
        }
    }

    fn styled(self, style: NodeStyle) -> Node {
        Node {
            id: self.id,
            label: self.label,
            combo_id: self.combo_id,
            is_bin: self.is_bin,
            path: self.path,
            style,
        }
    }
}

fn combo_for(path: &[String]) -> Combo {
    let parent_id = match path.len() {
        0 | 1 => None,
        n => Some(digest(&join(&path[..n - 1]))),
    };
    Combo {
        id: digest(&join(path)),
        label: path.last().cloned().unwrap_or_default(),
        parent_id,
        path: path.to_vec(),
    }
}

/// Every parent path, or ancestor of one, whose last segment ends in `" bin"`.
fn detect_bins(links: &[LinkRecord]) -> HashSet<String> {
    let mut bins = HashSet::new();
    for link in links {
        let segments: Vec<&str> = link.parent_path.split(PATH_SEPARATOR).collect();
        for end in 1..=segments.len() {
            if segments[end - 1].ends_with(BIN_SUFFIX) {
                bins.insert(segments[..end].join(PATH_SEPARATOR));
            }
        }
    }
    bins
}

fn format_endpoint(
    link: &LinkRecord,
    ancestry: &[String],
    name: &str,
    pad: &str,
    bins: &HashSet<String>,
) -> Endpoint {
    if name == BIN_ITSELF {
        let last_parent = ancestry.last().map(String::as_str).unwrap_or_default();
        let bin_name = last_parent.strip_suffix(BIN_SUFFIX).unwrap_or(last_parent);
        return Endpoint::new(ancestry.to_vec(), format!("{bin_name}\n{pad}"), true);
    }

    let bin_segment = format!("{name}{BIN_SUFFIX}");
    if bins.contains(&format!("{}{PATH_SEPARATOR}{bin_segment}", link.parent_path)) {
        let mut path = ancestry.to_vec();
        path.push(bin_segment);
        return Endpoint::new(path, format!("{name}\n{pad}"), true);
    }

    Endpoint::new(ancestry.to_vec(), name.to_string(), false)
}

#[derive(Default)]
struct GraphFold {
    nodes: IndexSet<Endpoint>,
    edges: IndexSet<Edge>,
    combos: IndexSet<Combo>,
}

impl GraphFold {
    fn add_link(&mut self, link: &LinkRecord, bins: &HashSet<String>) {
        let ancestry: Vec<String> = link
            .parent_path
            .split(PATH_SEPARATOR)
            .map(String::from)
            .collect();

        let source = format_endpoint(link, &ancestry, &link.from, &link.pad_from, bins);
        let target = format_endpoint(link, &ancestry, &link.to, &link.pad_to, bins);

        self.edges.insert(Edge {
            source: source.id.clone(),
            target: target.id.clone(),
        });
        for endpoint in [source, target] {
            self.add_combos(&endpoint.path);
            self.nodes.insert(endpoint);
        }
    }

    fn add_combos(&mut self, path: &[String]) {
        for end in 1..=path.len() {
            self.combos.insert(combo_for(&path[..end]));
        }
    }

    fn styled_nodes(self, liveness: &Liveness) -> TopologyGraph {
        let nodes = self
            .nodes
            .into_iter()
            .map(|endpoint| {
                let liveness_path = endpoint.liveness_path();
                let style = match liveness.classify(&liveness_path) {
                    Some(class) => class.style(endpoint.is_bin),
                    None => {
                        tracing::warn!(
                            "Node {:?} has no liveness entry for path {:?}",
                            endpoint.label,
                            liveness_path
                        );
                        NodeStyle::default()
                    }
                };
                endpoint.styled(style)
            })
            .collect();

        TopologyGraph {
            nodes,
            edges: self.edges.into_iter().collect(),
            combos: self.combos.into_iter().collect(),
        }
    }
}

/// Build the deduplicated graph for one topology snapshot, then style it by liveness.
pub fn marshal(links: &[LinkRecord], liveness: &Liveness) -> TopologyGraph {
    let bins = detect_bins(links);

    let mut fold = GraphFold::default();
    for link in links {
        fold.add_link(link, &bins);
    }

    fold.styled_nodes(liveness)
}
