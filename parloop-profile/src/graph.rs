//! Line-level call graph built from a decoded profile.
//!
//! Nodes are keyed by (function, file, line) so that distinct call sites in
//! one function stay distinct; that is what lets loop attribution sum only
//! the nodes whose line falls inside the loop. A second, line-zero node per
//! function represents the function as a whole, mirroring pprof.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::Profile;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub name: String,
    pub file: String,
    pub start_line: i64,
    pub lineno: i64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub info: NodeInfo,
    /// Time spent in this node itself.
    pub flat: i64,
    /// Time spent in this node and everything it calls.
    pub cum: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
}

impl Graph {
    pub fn from_profile(prof: &Profile) -> Graph {
        let functions: FxHashMap<u64, usize> = prof
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id, i))
            .collect();
        let locations: FxHashMap<u64, usize> = prof
            .locations
            .iter()
            .enumerate()
            .map(|(i, l)| (l.id, i))
            .collect();

        let weight_index = prof.weight_index();
        let mut nodes: Vec<Node> = Vec::new();
        let mut index: FxHashMap<NodeInfo, usize> = FxHashMap::default();
        let mut intern = |nodes: &mut Vec<Node>, info: NodeInfo| -> usize {
            *index.entry(info.clone()).or_insert_with(|| {
                nodes.push(Node {
                    info,
                    flat: 0,
                    cum: 0,
                });
                nodes.len() - 1
            })
        };

        for sample in &prof.samples {
            let weight = match sample.values.get(weight_index) {
                Some(&w) if w != 0 => w,
                _ => continue,
            };
            // Each node counts a sample's weight once, however many times it
            // recurses within the stack.
            let mut seen: FxHashSet<usize> = FxHashSet::default();
            let mut leaf: Option<usize> = None;
            // location_ids[0] is the leaf; walk root to leaf.
            for &loc_id in sample.location_ids.iter().rev() {
                let loc = match locations.get(&loc_id) {
                    Some(&i) => &prof.locations[i],
                    None => continue,
                };
                for line in loc.lines.iter().rev() {
                    let func = match functions.get(&line.function_id) {
                        Some(&i) => &prof.functions[i],
                        None => continue,
                    };
                    let id = intern(
                        &mut nodes,
                        NodeInfo {
                            name: func.name.clone(),
                            file: func.filename.clone(),
                            start_line: func.start_line,
                            lineno: line.line,
                        },
                    );
                    if seen.insert(id) {
                        nodes[id].cum += weight;
                    }
                    leaf = Some(id);
                }
            }
            if let Some(id) = leaf {
                nodes[id].flat += weight;
            }
        }

        nodes.retain(|n| n.cum != 0 || n.flat != 0);
        // Heaviest first; name then line break ties so the order is stable.
        nodes.sort_by(|a, b| {
            b.cum
                .cmp(&a.cum)
                .then_with(|| a.info.name.cmp(&b.info.name))
                .then_with(|| a.info.lineno.cmp(&b.info.lineno))
        });
        Graph { nodes }
    }

    /// All nodes whose source line falls in `[start, end]`.
    pub fn nodes_in_line_range(&self, start: i64, end: i64) -> Vec<&Node> {
        let found: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.info.lineno >= start && n.info.lineno <= end)
            .collect();
        if found.is_empty() {
            log::debug!("no profile nodes between lines {start} and {end}");
        }
        found
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Function, Line, Location, Sample, ValueType};

    fn profile_with_stack() -> Profile {
        Profile {
            sample_types: vec![
                ValueType {
                    kind: "samples".into(),
                    unit: "count".into(),
                },
                ValueType {
                    kind: "cpu".into(),
                    unit: "nanoseconds".into(),
                },
            ],
            samples: vec![
                Sample {
                    location_ids: vec![2, 1],
                    values: vec![1, 30_000_000],
                },
                Sample {
                    location_ids: vec![1],
                    values: vec![1, 10_000_000],
                },
            ],
            locations: vec![
                Location {
                    id: 1,
                    address: 0,
                    lines: vec![Line {
                        function_id: 1,
                        line: 10,
                    }],
                },
                Location {
                    id: 2,
                    address: 0,
                    lines: vec![Line {
                        function_id: 2,
                        line: 22,
                    }],
                },
            ],
            functions: vec![
                Function {
                    id: 1,
                    name: "main.Run".into(),
                    filename: "main.go".into(),
                    start_line: 8,
                },
                Function {
                    id: 2,
                    name: "main.work".into(),
                    filename: "main.go".into(),
                    start_line: 20,
                },
            ],
            time_nanos: 0,
            duration_nanos: 40_000_000,
        }
    }

    #[test]
    fn cum_counts_whole_stack_and_flat_counts_leaf() {
        let graph = profile_with_stack().graph();
        let run = graph
            .nodes
            .iter()
            .find(|n| n.info.name == "main.Run")
            .unwrap();
        let work = graph
            .nodes
            .iter()
            .find(|n| n.info.name == "main.work")
            .unwrap();
        assert_eq!(run.cum, 40_000_000);
        assert_eq!(run.flat, 10_000_000);
        assert_eq!(work.cum, 30_000_000);
        assert_eq!(work.flat, 30_000_000);
    }

    #[test]
    fn line_range_filter() {
        let graph = profile_with_stack().graph();
        let hits = graph.nodes_in_line_range(20, 25);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].info.name, "main.work");
        assert!(graph.nodes_in_line_range(90, 99).is_empty());
    }

    #[test]
    fn recursion_counts_once_per_sample() {
        let mut prof = profile_with_stack();
        // main.work calling itself: cum must not double-count.
        prof.samples = vec![Sample {
            location_ids: vec![2, 2, 1],
            values: vec![1, 7_000_000],
        }];
        let graph = prof.graph();
        let work = graph
            .nodes
            .iter()
            .find(|n| n.info.name == "main.work")
            .unwrap();
        assert_eq!(work.cum, 7_000_000);
    }
}
