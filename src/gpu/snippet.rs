//! Snippet composition graph
//!
//! Snippets are named source fragments with dependencies on previously registered
//! snippets. Because a snippet can only require ids that already exist, the graph is
//! acyclic by construction.
//!
//! `compose` emits each reachable snippet once, dependencies first. Emission marks are
//! stamped with a per-build generation, so the graph is reused across builds without
//! clearing anything.

use rustc_hash::FxHashMap;

use crate::error::SnippetError;

/// Handle to a registered snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnippetId(usize);

struct Snippet {
    name: String,
    body: String,
    requires: Vec<SnippetId>,
    /// Generation of the last build that emitted this snippet
    emitted: u64,
}

/// Registry of snippets and the dependency edges between them
pub struct SnippetGraph {
    snippets: Vec<Snippet>,
    by_name: FxHashMap<String, SnippetId>,
    generation: u64,
}

impl Default for SnippetGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SnippetGraph {
    pub fn new() -> Self {
        Self {
            snippets: Vec::new(),
            by_name: FxHashMap::default(),
            generation: 0,
        }
    }

    /// Register a snippet. Requirements are emitted in the order given.
    pub fn register(
        &mut self,
        name: &str,
        body: &str,
        requires: &[SnippetId],
    ) -> Result<SnippetId, SnippetError> {
        if self.by_name.contains_key(name) {
            return Err(SnippetError::Duplicate(name.to_string()));
        }
        if let Some(stray) = requires.iter().find(|r| r.0 >= self.snippets.len()) {
            return Err(SnippetError::Unknown(format!("#{}", stray.0)));
        }

        let id = SnippetId(self.snippets.len());
        self.snippets.push(Snippet {
            name: name.to_string(),
            body: body.to_string(),
            requires: requires.to_vec(),
            emitted: 0,
        });
        self.by_name.insert(name.to_string(), id);
        log::debug!("[SnippetGraph] Registered '{}' ({} requirements)", name, requires.len());
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Result<SnippetId, SnippetError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SnippetError::Unknown(name.to_string()))
    }

    pub fn name(&self, id: SnippetId) -> &str {
        &self.snippets[id.0].name
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Emit every snippet reachable from `roots`, dependencies before dependents
    pub fn compose(&mut self, roots: &[SnippetId]) -> String {
        self.generation += 1;
        let mut source = String::new();
        for &root in roots {
            self.emit(root, &mut source);
        }
        source
    }

    fn emit(&mut self, id: SnippetId, source: &mut String) {
        let generation = self.generation;
        if self.snippets[id.0].emitted == generation {
            return;
        }
        self.snippets[id.0].emitted = generation;

        // Requirements always have smaller ids, so this recursion terminates
        let requires = self.snippets[id.0].requires.clone();
        for dependency in requires {
            self.emit(dependency, source);
        }

        let snippet = &self.snippets[id.0];
        source.push_str("// Begin snippet: ");
        source.push_str(&snippet.name);
        source.push('\n');
        source.push_str(&snippet.body);
        if !snippet.body.ends_with('\n') {
            source.push('\n');
        }
        source.push_str("// End snippet: ");
        source.push_str(&snippet.name);
        source.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rustc_hash::FxHashSet;

    fn order(source: &str) -> Vec<&str> {
        source
            .lines()
            .filter_map(|line| line.strip_prefix("// Begin snippet: "))
            .collect()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let mut graph = SnippetGraph::new();
        let a = graph.register("a", "fn a() {}", &[]).unwrap();
        let b = graph.register("b", "fn b() {}", &[a]).unwrap();
        let c = graph.register("c", "fn c() {}", &[a]).unwrap();
        let d = graph.register("d", "fn d() {}", &[b, c]).unwrap();

        let source = graph.compose(&[d]);
        assert_eq!(order(&source), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_shared_dependency_emitted_once_across_roots() {
        let mut graph = SnippetGraph::new();
        let common = graph.register("common", "const X: u32 = 1u;", &[]).unwrap();
        let left = graph.register("left", "fn l() {}", &[common]).unwrap();
        let right = graph.register("right", "fn r() {}", &[common]).unwrap();

        let source = graph.compose(&[left, right]);
        assert_eq!(order(&source), vec!["common", "left", "right"]);
    }

    #[test]
    fn test_graph_reusable_between_builds() {
        let mut graph = SnippetGraph::new();
        let a = graph.register("a", "fn a() {}", &[]).unwrap();
        let b = graph.register("b", "fn b() {}", &[a]).unwrap();

        let first = graph.compose(&[b]);
        let second = graph.compose(&[b]);
        assert_eq!(first, second);
        assert_eq!(order(&graph.compose(&[a])), vec!["a"]);
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let mut graph = SnippetGraph::new();
        graph.register("a", "", &[]).unwrap();
        assert_eq!(
            graph.register("a", "", &[]),
            Err(SnippetError::Duplicate("a".to_string()))
        );
        assert_eq!(graph.lookup("zzz"), Err(SnippetError::Unknown("zzz".to_string())));
        assert_eq!(graph.name(graph.lookup("a").unwrap()), "a");
    }

    /// Every snippet reachable from `id`, excluding `id` itself
    fn closure(requires: &[Vec<usize>], id: usize, out: &mut FxHashSet<usize>) {
        for &dep in &requires[id] {
            if out.insert(dep) {
                closure(requires, dep, out);
            }
        }
    }

    #[test]
    fn test_random_graphs_emit_each_reachable_snippet_once_after_its_deps() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let mut graph = SnippetGraph::new();
            let count = rng.gen_range(1..40usize);
            let mut requires: Vec<Vec<usize>> = Vec::with_capacity(count);
            let mut ids = Vec::with_capacity(count);
            for i in 0..count {
                // repeats are allowed and must not cause a second emission
                let deps: Vec<usize> = if i == 0 {
                    Vec::new()
                } else {
                    (0..rng.gen_range(0..4)).map(|_| rng.gen_range(0..i)).collect()
                };
                let dep_ids: Vec<SnippetId> = deps.iter().map(|&d| ids[d]).collect();
                ids.push(graph.register(&format!("s{}", i), &format!("fn s{}() {{}}", i), &dep_ids).unwrap());
                requires.push(deps);
            }

            let roots: Vec<usize> = (0..rng.gen_range(1..4)).map(|_| rng.gen_range(0..count)).collect();
            let root_ids: Vec<SnippetId> = roots.iter().map(|&r| ids[r]).collect();
            let source = graph.compose(&root_ids);
            let emitted = order(&source);

            let mut reachable = FxHashSet::default();
            for &root in &roots {
                reachable.insert(root);
                closure(&requires, root, &mut reachable);
            }
            assert_eq!(emitted.len(), reachable.len(), "emitted {:?}", emitted);

            let position: FxHashMap<&str, usize> = emitted.iter().enumerate().map(|(i, &n)| (n, i)).collect();
            assert_eq!(position.len(), emitted.len(), "a snippet was emitted twice");
            for &id in &reachable {
                let name = format!("s{}", id);
                let at = position[name.as_str()];
                let mut deps = FxHashSet::default();
                closure(&requires, id, &mut deps);
                for dep in deps {
                    let dep_at = position[format!("s{}", dep).as_str()];
                    assert!(dep_at < at, "s{} emitted after its dependent {}", dep, name);
                }
            }
        }
    }
}
