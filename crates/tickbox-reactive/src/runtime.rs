#![forbid(unsafe_code)]

//! The dependency graph shared by every cell.
//!
//! # Design
//!
//! Cells do not hold references to each other. Every [`Observable`] and
//! [`Computed`] registers a node in a central arena owned by [`Runtime`] and
//! refers to other cells only through [`NodeId`]s. Each node keeps two
//! ordered edge lists:
//!
//! - `dependencies`: the cells read during the node's last evaluation.
//! - `dependents`: the derived cells that read this node last time they ran.
//!
//! Reads are tracked with a stack of evaluation frames. While a computed cell
//! evaluates, every `get()` on another cell is recorded in the top frame;
//! when the evaluation commits, the recorded set *replaces* the node's
//! dependency list and the reverse edges are patched to match.
//!
//! Invalidation is push-dirty / pull-value: a change marks the full
//! transitive closure of dependents dirty. Lazy cells recompute on their next
//! read. Eager cells are queued and refreshed before the mutating call
//! returns (or when the outermost [`Runtime::batch`] exits). Throttled cells
//! arm a debounce timer on the runtime's [`Scheduler`] instead.
//!
//! # Invariants
//!
//! 1. `a ∈ b.dependents` iff `b ∈ a.dependencies`, for live nodes.
//! 2. A node is never on the evaluation stack twice; re-entry is a cycle.
//! 3. No graph borrow is held while user code (compute functions, setters,
//!    subscriber callbacks, timer tasks) runs.
//!
//! [`Observable`]: crate::Observable
//! [`Computed`]: crate::Computed

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use web_time::Duration;

use crate::clock::Clock;
use crate::error::ReactiveError;
use crate::scheduler::{Scheduler, TimerId};

/// Index of a node in the runtime arena.
///
/// The generation makes ids of released nodes inert: a stale id never
/// aliases the node that later reuses its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// When a derived node recomputes after being invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Evaluation {
    /// On the next read.
    #[default]
    Lazy,
    /// Before the mutating call (or outermost batch) returns.
    Eager,
    /// When no invalidation has arrived for the given window.
    Throttled(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Derived(Evaluation),
}

/// Hook the runtime uses to re-run an eager or throttled node.
pub(crate) trait Refresh {
    fn refresh(&self);
}

struct Node {
    label: String,
    kind: NodeKind,
    dirty: bool,
    dependencies: Vec<NodeId>,
    dependents: Vec<NodeId>,
    refresh: Option<Weak<dyn Refresh>>,
    timer: Option<TimerId>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// One open evaluation. `node == None` marks an untracked region.
struct Frame {
    node: Option<NodeId>,
    reads: Vec<NodeId>,
}

#[derive(Default)]
struct Graph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    frames: Vec<Frame>,
    batch_depth: usize,
    queue: VecDeque<NodeId>,
    flushing: bool,
}

impl Graph {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn insert(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node)
    }

    fn label_of(&self, id: NodeId) -> String {
        self.node(id)
            .map_or_else(|| id.to_string(), |node| node.label.clone())
    }

    fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }
}

/// Cheaply cloneable handle to a dependency graph and its timer queue.
///
/// All cells created from clones of one runtime share the same graph.
#[derive(Clone)]
pub struct Runtime {
    graph: Rc<RefCell<Graph>>,
    scheduler: Scheduler,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph.borrow();
        f.debug_struct("Runtime")
            .field("nodes", &graph.live_count())
            .field("batch_depth", &graph.batch_depth)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Runtime driven by the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::Real)
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            graph: Rc::new(RefCell::new(Graph::default())),
            scheduler: Scheduler::new(clock),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Fire due timers. The host event loop calls this on every wake-up.
    pub fn run_due(&self) -> usize {
        self.scheduler.run_due()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.borrow().live_count()
    }

    #[must_use]
    pub fn label(&self, id: NodeId) -> Option<String> {
        self.graph.borrow().node(id).map(|node| node.label.clone())
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.graph.borrow().node(id).map(|node| node.kind)
    }

    #[must_use]
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .borrow()
            .node(id)
            .map(|node| node.dependencies.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.graph
            .borrow()
            .node(id)
            .map(|node| node.dependents.clone())
            .unwrap_or_default()
    }

    /// Whether a computed evaluation is currently recording reads.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.graph
            .borrow()
            .frames
            .last()
            .is_some_and(|frame| frame.node.is_some())
    }

    /// Run `f`, deferring eager refreshes until the outermost batch exits.
    ///
    /// Subscriber callbacks still run synchronously inside the batch.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.graph.borrow_mut().batch_depth += 1;
        let guard = BatchGuard(self);
        let out = f();
        drop(guard);
        self.flush();
        out
    }

    /// Run `f` without recording its reads as dependencies.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.graph.borrow_mut().frames.push(Frame {
            node: None,
            reads: Vec::new(),
        });
        let _guard = UntrackedGuard(self);
        f()
    }

    // ── Crate-internal graph operations ──────────────────────────────

    pub(crate) fn register(&self, label: impl Into<String>, kind: NodeKind) -> NodeId {
        let dirty = matches!(kind, NodeKind::Derived(_));
        self.graph.borrow_mut().insert(Node {
            label: label.into(),
            kind,
            dirty,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            refresh: None,
            timer: None,
        })
    }

    pub(crate) fn set_label(&self, id: NodeId, label: impl Into<String>) {
        if let Some(node) = self.graph.borrow_mut().node_mut(id) {
            node.label = label.into();
        }
    }

    pub(crate) fn set_refresh(&self, id: NodeId, refresh: Weak<dyn Refresh>) {
        if let Some(node) = self.graph.borrow_mut().node_mut(id) {
            node.refresh = Some(refresh);
        }
    }

    /// Detach and free a node whose last handle was dropped.
    pub(crate) fn release(&self, id: NodeId) {
        let Ok(mut graph) = self.graph.try_borrow_mut() else {
            tracing::warn!(node = %id, "graph busy during release; node leaked");
            return;
        };
        let Some(node) = graph.remove(id) else {
            return;
        };
        for dep in &node.dependencies {
            if let Some(upstream) = graph.node_mut(*dep) {
                upstream.dependents.retain(|d| *d != id);
            }
        }
        for dep in &node.dependents {
            if let Some(downstream) = graph.node_mut(*dep) {
                downstream.dependencies.retain(|d| *d != id);
            }
        }
        graph.queue.retain(|queued| *queued != id);
        drop(graph);
        if let Some(timer) = node.timer {
            self.scheduler.cancel(timer);
        }
    }

    /// Record a read of `id` in the innermost open evaluation.
    pub(crate) fn track(&self, id: NodeId) {
        let mut graph = self.graph.borrow_mut();
        if let Some(frame) = graph.frames.last_mut()
            && frame.node.is_some()
            && frame.node != Some(id)
            && !frame.reads.contains(&id)
        {
            frame.reads.push(id);
        }
    }

    pub(crate) fn is_dirty(&self, id: NodeId) -> bool {
        self.graph.borrow().node(id).is_some_and(|node| node.dirty)
    }

    /// Open an evaluation frame for `id`.
    ///
    /// Fails with [`ReactiveError::Cycle`] if `id` is already evaluating.
    pub(crate) fn begin_evaluation(&self, id: NodeId) -> Result<Evaluating<'_>, ReactiveError> {
        let mut graph = self.graph.borrow_mut();
        if let Some(pos) = graph.frames.iter().position(|f| f.node == Some(id)) {
            let mut path: Vec<String> = graph.frames[pos..]
                .iter()
                .filter_map(|frame| frame.node)
                .map(|node| graph.label_of(node))
                .collect();
            path.push(graph.label_of(id));
            return Err(ReactiveError::Cycle { path });
        }
        graph.frames.push(Frame {
            node: Some(id),
            reads: Vec::new(),
        });
        Ok(Evaluating {
            rt: self,
            node: id,
            committed: false,
        })
    }

    fn finish_evaluation(&self, id: NodeId, commit: bool) {
        let mut graph = self.graph.borrow_mut();
        let Some(pos) = graph.frames.iter().rposition(|f| f.node == Some(id)) else {
            return;
        };
        let frame = graph.frames.remove(pos);
        if !commit {
            return;
        }
        let reads: Vec<NodeId> = frame
            .reads
            .into_iter()
            .filter(|dep| graph.node(*dep).is_some())
            .collect();
        let Some(node) = graph.node_mut(id) else {
            return;
        };
        let old = std::mem::take(&mut node.dependencies);
        node.dirty = false;
        for dep in old.iter().filter(|dep| !reads.contains(dep)) {
            if let Some(upstream) = graph.node_mut(*dep) {
                upstream.dependents.retain(|d| *d != id);
            }
        }
        for dep in reads.iter().filter(|dep| !old.contains(dep)) {
            if let Some(upstream) = graph.node_mut(*dep) {
                upstream.dependents.push(id);
            }
        }
        if let Some(node) = graph.node_mut(id) {
            node.dependencies = reads;
        }
    }

    /// A source changed: invalidate everything downstream of it.
    pub(crate) fn notify_changed(&self, id: NodeId) {
        let start = self.dependents(id);
        self.propagate(start);
    }

    /// Mark `id` itself dirty, then everything downstream of it.
    pub(crate) fn invalidate(&self, id: NodeId) {
        self.propagate(vec![id]);
        self.flush();
    }

    fn propagate(&self, start: Vec<NodeId>) {
        let mut graph = self.graph.borrow_mut();
        let mut stack = start;
        let mut visited: AHashSet<NodeId> = AHashSet::new();
        let mut throttled = Vec::new();
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            let Some(node) = graph.node_mut(next) else {
                continue;
            };
            node.dirty = true;
            let kind = node.kind;
            stack.extend(node.dependents.iter().copied());
            match kind {
                NodeKind::Derived(Evaluation::Eager) => {
                    if !graph.queue.contains(&next) {
                        graph.queue.push_back(next);
                    }
                }
                NodeKind::Derived(Evaluation::Throttled(window)) => throttled.push((next, window)),
                _ => {}
            }
        }
        if !visited.is_empty() {
            tracing::trace!(invalidated = visited.len(), "graph.propagate");
        }
        for (id, window) in throttled {
            self.arm_timer(&mut graph, id, window);
        }
    }

    /// Cancel any armed timer for `id` and start a fresh window.
    fn arm_timer(&self, graph: &mut Graph, id: NodeId, window: Duration) {
        let Some(node) = graph.node_mut(id) else {
            return;
        };
        let Some(refresh) = node.refresh.clone() else {
            return;
        };
        if let Some(previous) = node.timer.take() {
            self.scheduler.cancel(previous);
        }
        let timer = self.scheduler.schedule(window, move || {
            if let Some(target) = refresh.upgrade() {
                target.refresh();
            }
        });
        node.timer = Some(timer);
        tracing::debug!(node = %id, window_ms = window.as_millis() as u64, "throttle armed");
    }

    /// Cancel the pending debounce timer of `id`, if any.
    pub(crate) fn cancel_timer(&self, id: NodeId) -> bool {
        let timer = self
            .graph
            .borrow_mut()
            .node_mut(id)
            .and_then(|node| node.timer.take());
        timer.is_some_and(|timer| self.scheduler.cancel(timer))
    }

    pub(crate) fn has_pending_timer(&self, id: NodeId) -> bool {
        let timer = self.graph.borrow().node(id).and_then(|node| node.timer);
        timer.is_some_and(|timer| self.scheduler.is_pending(timer))
    }

    /// Refresh queued eager nodes until the queue is empty.
    pub(crate) fn flush(&self) {
        {
            let mut graph = self.graph.borrow_mut();
            if graph.batch_depth > 0 || graph.flushing {
                return;
            }
            graph.flushing = true;
        }
        let _guard = FlushGuard(self);
        loop {
            let next = {
                let mut graph = self.graph.borrow_mut();
                let mut found = None;
                while let Some(id) = graph.queue.pop_front() {
                    if let Some(node) = graph.node(id)
                        && node.dirty
                    {
                        found = node.refresh.clone();
                        break;
                    }
                }
                found
            };
            let Some(refresh) = next else {
                break;
            };
            if let Some(target) = refresh.upgrade() {
                target.refresh();
            }
        }
    }
}

/// An open evaluation frame. Dropping it without [`commit`](Self::commit)
/// (e.g. while unwinding) closes the frame and leaves the node dirty.
pub(crate) struct Evaluating<'a> {
    rt: &'a Runtime,
    node: NodeId,
    committed: bool,
}

impl Evaluating<'_> {
    pub(crate) fn commit(mut self) {
        self.committed = true;
        self.rt.finish_evaluation(self.node, true);
    }
}

impl Drop for Evaluating<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rt.finish_evaluation(self.node, false);
        }
    }
}

struct BatchGuard<'a>(&'a Runtime);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut graph) = self.0.graph.try_borrow_mut() {
            graph.batch_depth = graph.batch_depth.saturating_sub(1);
        }
    }
}

struct UntrackedGuard<'a>(&'a Runtime);

impl Drop for UntrackedGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut graph) = self.0.graph.try_borrow_mut()
            && let Some(pos) = graph.frames.iter().rposition(|f| f.node.is_none())
        {
            graph.frames.remove(pos);
        }
    }
}

struct FlushGuard<'a>(&'a Runtime);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut graph) = self.0.graph.try_borrow_mut() {
            graph.flushing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_slot_is_reused_with_new_generation() {
        let rt = Runtime::new();
        let a = rt.register("a", NodeKind::Source);
        rt.release(a);
        let b = rt.register("b", NodeKind::Source);
        assert_ne!(a, b);
        assert_eq!(rt.label(a), None);
        assert_eq!(rt.label(b).as_deref(), Some("b"));
        assert_eq!(rt.node_count(), 1);
    }

    #[test]
    fn commit_replaces_dependency_set() {
        let rt = Runtime::new();
        let x = rt.register("x", NodeKind::Source);
        let y = rt.register("y", NodeKind::Source);
        let d = rt.register("d", NodeKind::Derived(Evaluation::Lazy));

        let eval = rt.begin_evaluation(d).unwrap();
        rt.track(x);
        rt.track(x);
        eval.commit();
        assert_eq!(rt.dependencies(d), vec![x]);
        assert_eq!(rt.dependents(x), vec![d]);
        assert!(!rt.is_dirty(d));

        let eval = rt.begin_evaluation(d).unwrap();
        rt.track(y);
        eval.commit();
        assert_eq!(rt.dependencies(d), vec![y]);
        assert!(rt.dependents(x).is_empty());
        assert_eq!(rt.dependents(y), vec![d]);
    }

    #[test]
    fn reentry_reports_cycle_path() {
        let rt = Runtime::new();
        let a = rt.register("a", NodeKind::Derived(Evaluation::Lazy));
        let b = rt.register("b", NodeKind::Derived(Evaluation::Lazy));
        let _outer = rt.begin_evaluation(a).unwrap();
        let _inner = rt.begin_evaluation(b).unwrap();
        let err = rt.begin_evaluation(a).err().unwrap();
        assert_eq!(
            err,
            ReactiveError::Cycle {
                path: vec!["a".into(), "b".into(), "a".into()]
            }
        );
    }

    #[test]
    fn abandoned_evaluation_keeps_node_dirty() {
        let rt = Runtime::new();
        let x = rt.register("x", NodeKind::Source);
        let d = rt.register("d", NodeKind::Derived(Evaluation::Lazy));
        {
            let _eval = rt.begin_evaluation(d).unwrap();
            rt.track(x);
        }
        assert!(rt.is_dirty(d));
        assert!(rt.dependencies(d).is_empty());
        assert!(!rt.is_tracking());
    }

    #[test]
    fn untracked_region_records_nothing() {
        let rt = Runtime::new();
        let x = rt.register("x", NodeKind::Source);
        let d = rt.register("d", NodeKind::Derived(Evaluation::Lazy));
        let eval = rt.begin_evaluation(d).unwrap();
        rt.untracked(|| rt.track(x));
        assert!(rt.is_tracking());
        eval.commit();
        assert!(rt.dependencies(d).is_empty());
    }

    #[test]
    fn propagation_reaches_transitive_dependents() {
        let rt = Runtime::new();
        let x = rt.register("x", NodeKind::Source);
        let mid = rt.register("mid", NodeKind::Derived(Evaluation::Lazy));
        let top = rt.register("top", NodeKind::Derived(Evaluation::Lazy));

        let eval = rt.begin_evaluation(top).unwrap();
        rt.track(mid);
        eval.commit();
        let eval = rt.begin_evaluation(mid).unwrap();
        rt.track(x);
        eval.commit();
        assert!(!rt.is_dirty(top));

        rt.notify_changed(x);
        assert!(rt.is_dirty(mid));
        assert!(rt.is_dirty(top));
    }

    #[test]
    fn release_detaches_both_directions() {
        let rt = Runtime::new();
        let x = rt.register("x", NodeKind::Source);
        let d = rt.register("d", NodeKind::Derived(Evaluation::Lazy));
        let eval = rt.begin_evaluation(d).unwrap();
        rt.track(x);
        eval.commit();

        rt.release(x);
        assert!(rt.dependencies(d).is_empty());
        assert_eq!(rt.kind(d), Some(NodeKind::Derived(Evaluation::Lazy)));
    }
}
