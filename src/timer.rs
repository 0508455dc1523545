//! Hierarchical scoped timings (spec §4.11). A `Timer` is per-instance, not
//! a process-wide singleton (spec §9's "global mutable state" note), so it
//! can be threaded explicitly into whichever components opt into timing —
//! the same discipline the teacher applies to its `stats` collector.

use crate::error::{bail, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct Timing {
    pub name: String,
    pub domain_id: Option<i64>,
    pub num_calls: u64,
    pub min: Duration,
    pub max: Duration,
    pub sum: Duration,
    pub children: Vec<Timing>,
}

impl Timing {
    fn new(name: String, domain_id: Option<i64>) -> Self {
        Self { name, domain_id, num_calls: 0, min: Duration::MAX, max: Duration::ZERO, sum: Duration::ZERO, children: Vec::new() }
    }

    fn record(&mut self, elapsed: Duration) {
        self.num_calls += 1;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
        self.sum += elapsed;
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "domain_id": self.domain_id,
            "num_calls": self.num_calls,
            "min_secs": self.min.as_secs_f64(),
            "max_secs": self.max.as_secs_f64(),
            "sum_secs": self.sum.as_secs_f64(),
            "children": self.children.iter().map(Timing::to_json).collect::<Vec<_>>(),
        })
    }

    /// "A -> B -> C" style path text when every node on the path has exactly
    /// one call, a statistics table otherwise (spec §4.11).
    fn write_text(&self, out: &mut String, prefix: &str) {
        let path = if prefix.is_empty() { self.name.clone() } else { format!("{} -> {}", prefix, self.name) };
        if self.num_calls == 1 && self.children.len() <= 1 {
            out.push_str(&format!("{}: {:.6}s\n", path, self.sum.as_secs_f64()));
        } else {
            out.push_str(&format!(
                "{}: calls={} min={:.6}s max={:.6}s sum={:.6}s\n",
                path,
                self.num_calls,
                self.min.as_secs_f64(),
                self.max.as_secs_f64(),
                self.sum.as_secs_f64()
            ));
        }
        for child in &self.children {
            child.write_text(out, &path);
        }
    }
}

fn descend_mut<'a>(level: &'a mut Vec<Timing>, path: &[usize]) -> &'a mut Vec<Timing> {
    match path.split_first() {
        None => level,
        Some((&i, rest)) => descend_mut(&mut level[i].children, rest),
    }
}

fn node_mut<'a>(roots: &'a mut Vec<Timing>, path: &[usize]) -> &'a mut Timing {
    let (&i, rest) = path.split_first().expect("path_stack is non-empty whenever a node is looked up");
    if rest.is_empty() {
        &mut roots[i]
    } else {
        node_mut(&mut roots[i].children, rest)
    }
}

struct ActiveSpan {
    name: String,
    started_at: Instant,
}

/// Tracks one call stack of started-but-not-stopped names, plus the
/// completed tree of [`Timing`] nodes it has accumulated.
pub struct Timer {
    domains: HashMap<i64, String>,
    roots: Vec<Timing>,
    stack: Vec<ActiveSpan>,
    /// Path of node-name-vectors currently open, mirroring `stack` one level
    /// of nesting per entry, used to locate where a completed span's
    /// `Timing` belongs in `roots`.
    path_stack: Vec<usize>,
}

impl Timer {
    pub fn new() -> Self {
        Self { domains: HashMap::new(), roots: Vec::new(), stack: Vec::new(), path_stack: Vec::new() }
    }

    pub fn add_domain(&mut self, id: i64, info: impl Into<String>) -> Result<()> {
        if self.domains.contains_key(&id) {
            bail!("domain id {} is already registered with this timer", id);
        }
        self.domains.insert(id, info.into());
        Ok(())
    }

    pub fn start(&mut self, name: impl Into<String>) {
        self.start_impl(name.into(), None);
    }

    pub fn start_domain_timing(&mut self, id: i64, name: impl Into<String>) {
        self.start_impl(name.into(), Some(id));
    }

    fn start_impl(&mut self, name: String, domain_id: Option<i64>) {
        let siblings = descend_mut(&mut self.roots, &self.path_stack);
        let index = match siblings.iter().position(|t| t.name == name) {
            Some(i) => i,
            None => {
                siblings.push(Timing::new(name, domain_id));
                siblings.len() - 1
            }
        };
        self.path_stack.push(index);
        self.stack.push(ActiveSpan { name: node_mut(&mut self.roots, &self.path_stack).name.clone(), started_at: Instant::now() });
    }

    pub fn stop(&mut self, name: &str) -> Result<()> {
        match self.stack.last() {
            Some(top) if top.name == name => {}
            Some(top) => bail!("expected to stop \"{}\" but \"{}\" is the current timing", top.name, name),
            None => bail!("stop(\"{}\") called with no timing started", name),
        }
        let span = self.stack.pop().unwrap();
        let elapsed = span.started_at.elapsed();
        node_mut(&mut self.roots, &self.path_stack).record(elapsed);
        self.path_stack.pop();
        Ok(())
    }

    pub fn roots(&self) -> &[Timing] {
        &self.roots
    }

    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            root.write_text(&mut out, "");
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "domains": self.domains,
            "timings": self.roots.iter().map(Timing::to_json).collect::<Vec<_>>(),
        })
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn well_nested_start_stop_records_one_call() {
        let mut t = Timer::new();
        t.start("solve");
        t.stop("solve").unwrap();
        assert_eq!(t.roots()[0].num_calls, 1);
        assert!(t.is_idle());
    }

    #[test]
    fn nested_timings_form_a_tree() {
        let mut t = Timer::new();
        t.start("A");
        t.start("B");
        t.stop("B").unwrap();
        t.stop("A").unwrap();
        assert_eq!(t.roots().len(), 1);
        assert_eq!(t.roots()[0].children.len(), 1);
        assert_eq!(t.roots()[0].children[0].name, "B");
    }

    #[test]
    fn stopping_out_of_order_is_an_error() {
        let mut t = Timer::new();
        t.start("A");
        t.start("B");
        let err = t.stop("A").unwrap_err();
        assert!(err.0.contains("B"));
    }

    #[test]
    fn repeated_calls_accumulate_statistics() {
        let mut t = Timer::new();
        for _ in 0..3 {
            t.start("loop");
            t.stop("loop").unwrap();
        }
        assert_eq!(t.roots()[0].num_calls, 3);
    }

    #[test]
    fn registering_domain_twice_is_an_error() {
        let mut t = Timer::new();
        t.add_domain(1, "finest").unwrap();
        assert!(t.add_domain(1, "finest again").is_err());
    }
}
