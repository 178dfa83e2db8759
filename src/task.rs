// ============================================================================
// Deferred Task Queue
// ============================================================================
//
// Layout, redraw and commit requests are not executed when they are made.
// Each view owns one layout task and one redraw task, each surface one commit
// task. Requesting work links the owner's task into an intrusive doubly-linked
// list; a task can be linked at most once, so repeated requests between two
// flushes coalesce. The flush pass unlinks each task before running it.
//
// Nodes live in a slab addressed by generational ids, so prev/next are plain
// indices and a stale TaskId can never reach a recycled slot.

use crate::surface::SurfaceId;
use crate::tree::ViewId;

/// Handle to a task slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

/// What running a task does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Run the view's layout hook.
    Layout(ViewId),
    /// Run the view's draw hook against its surface's buffer.
    Redraw(ViewId),
    /// Push the surface's pending state to the compositor.
    Commit(SurfaceId),
}

/// The pending lists a task can be queued on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Layout and redraw tasks.
    Idle,
    /// Surface commits, run after the idle tasks of the same flush.
    Commit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListId {
    Idle,
    Commit,
    /// Snapshot being consumed by the current flush.
    Running,
}

impl From<Queue> for ListId {
    fn from(queue: Queue) -> Self {
        match queue {
            Queue::Idle => ListId::Idle,
            Queue::Commit => ListId::Commit,
        }
    }
}

#[derive(Default, Clone, Copy)]
struct List {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

struct TaskNode {
    kind: TaskKind,
    prev: Option<u32>,
    next: Option<u32>,
    list: Option<ListId>,
}

struct Slot {
    generation: u32,
    node: Option<TaskNode>,
}

/// Owner of every task node and of the idle, commit and running lists.
pub struct TaskQueue {
    slots: Vec<Slot>,
    free_indices: Vec<u32>,
    idle: List,
    commit: List,
    running: List,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            idle: List::default(),
            commit: List::default(),
            running: List::default(),
        }
    }

    /// Allocate an unlinked task. Owners allocate their tasks once and keep them.
    pub fn allocate(&mut self, kind: TaskKind) -> TaskId {
        let node = TaskNode {
            kind,
            prev: None,
            next: None,
            list: None,
        };
        if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            return TaskId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        TaskId {
            index,
            generation: 0,
        }
    }

    /// Unlink and free a task. Stale ids are ignored.
    pub fn release(&mut self, id: TaskId) {
        if self.node(id).is_none() {
            return;
        }
        self.unlink(id);
        self.slots[id.index as usize].node = None;
        self.free_indices.push(id.index);
    }

    fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_at(&mut self, index: u32) -> &mut TaskNode {
        match self.slots[index as usize].node.as_mut() {
            Some(node) => node,
            None => unreachable!("linked task index {index} points at a free slot"),
        }
    }

    fn list_mut(&mut self, list: ListId) -> &mut List {
        match list {
            ListId::Idle => &mut self.idle,
            ListId::Commit => &mut self.commit,
            ListId::Running => &mut self.running,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.node(id).is_some()
    }

    pub fn kind(&self, id: TaskId) -> Option<TaskKind> {
        self.node(id).map(|n| n.kind)
    }

    /// Linked anywhere, including the snapshot of a flush in progress.
    pub fn is_linked(&self, id: TaskId) -> bool {
        self.node(id).is_some_and(|n| n.list.is_some())
    }

    /// Linked on a pending list, i.e. it will run in a later flush pass
    /// rather than in the one currently executing.
    pub fn is_queued(&self, id: TaskId) -> bool {
        self.node(id)
            .is_some_and(|n| matches!(n.list, Some(ListId::Idle | ListId::Commit)))
    }

    /// The pending list the task is on, if any.
    pub fn queue_of(&self, id: TaskId) -> Option<Queue> {
        match self.node(id)?.list? {
            ListId::Idle => Some(Queue::Idle),
            ListId::Commit => Some(Queue::Commit),
            ListId::Running => None,
        }
    }

    /// Remove the task from whatever list holds it. Safe on unlinked and
    /// stale tasks, and during a flush.
    pub fn unlink(&mut self, id: TaskId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let Some(list_id) = node.list else {
            return;
        };
        let (prev, next) = (node.prev, node.next);

        match prev {
            Some(p) => self.node_at(p).next = next,
            None => self.list_mut(list_id).head = next,
        }
        match next {
            Some(n) => self.node_at(n).prev = prev,
            None => self.list_mut(list_id).tail = prev,
        }
        self.list_mut(list_id).len -= 1;

        let node = self.node_at(id.index);
        node.prev = None;
        node.next = None;
        node.list = None;
    }

    fn link_between(&mut self, id: TaskId, list_id: ListId, prev: Option<u32>, next: Option<u32>) {
        let node = self.node_at(id.index);
        node.prev = prev;
        node.next = next;
        node.list = Some(list_id);

        match prev {
            Some(p) => self.node_at(p).next = Some(id.index),
            None => self.list_mut(list_id).head = Some(id.index),
        }
        match next {
            Some(n) => self.node_at(n).prev = Some(id.index),
            None => self.list_mut(list_id).tail = Some(id.index),
        }
        self.list_mut(list_id).len += 1;
    }

    /// Unlink the task, then append it to the tail of `queue`.
    pub fn push_back(&mut self, queue: Queue, id: TaskId) {
        if !self.contains(id) {
            return;
        }
        self.unlink(id);
        let list_id = ListId::from(queue);
        let tail = self.list_mut(list_id).tail;
        self.link_between(id, list_id, tail, None);
    }

    /// Unlink the task, then splice it directly after `after`.
    ///
    /// `after` must be queued on a pending list; otherwise nothing is linked
    /// and `false` is returned.
    pub fn insert_after(&mut self, id: TaskId, after: TaskId) -> bool {
        if id == after || !self.contains(id) || !self.is_queued(after) {
            return false;
        }
        self.unlink(id);
        let Some(anchor) = self.node(after) else {
            return false;
        };
        let (list_id, next) = match anchor.list {
            Some(list) => (list, anchor.next),
            None => return false,
        };
        self.link_between(id, list_id, Some(after.index), next);
        true
    }

    /// Unlink the task, then splice it directly before `before`.
    pub fn insert_before(&mut self, id: TaskId, before: TaskId) -> bool {
        if id == before || !self.contains(id) || !self.is_queued(before) {
            return false;
        }
        self.unlink(id);
        let Some(anchor) = self.node(before) else {
            return false;
        };
        let (list_id, prev) = match anchor.list {
            Some(list) => (list, anchor.prev),
            None => return false,
        };
        self.link_between(id, list_id, prev, Some(before.index));
        true
    }

    /// Move everything pending on `queue` into the running snapshot.
    ///
    /// Tasks queued after this call land on the (now empty) pending list and
    /// wait for the next flush.
    pub fn begin_flush(&mut self, queue: Queue) {
        debug_assert!(self.running.len == 0, "previous flush left tasks running");
        let list_id = ListId::from(queue);
        let taken = std::mem::take(self.list_mut(list_id));

        let mut cursor = taken.head;
        while let Some(index) = cursor {
            let node = self.node_at(index);
            node.list = Some(ListId::Running);
            cursor = node.next;
        }
        self.running = taken;
    }

    /// Unlink and return the next task of the running snapshot.
    pub fn pop_running(&mut self) -> Option<(TaskId, TaskKind)> {
        let index = self.running.head?;
        let id = TaskId {
            index,
            generation: self.slots[index as usize].generation,
        };
        let kind = self.node_at(index).kind;
        self.unlink(id);
        Some((id, kind))
    }

    pub fn len(&self, queue: Queue) -> usize {
        match queue {
            Queue::Idle => self.idle.len,
            Queue::Commit => self.commit.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.idle.len == 0 && self.commit.len == 0
    }

    /// Pending tasks of `queue` in execution order.
    pub fn pending(&self, queue: Queue) -> Vec<TaskKind> {
        let list = match queue {
            Queue::Idle => self.idle,
            Queue::Commit => self.commit,
        };
        let mut out = Vec::with_capacity(list.len);
        let mut cursor = list.head;
        while let Some(index) = cursor {
            let Some(node) = self.slots[index as usize].node.as_ref() else {
                break;
            };
            out.push(node.kind);
            cursor = node.next;
        }
        out
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ViewId;

    fn redraw(n: u32) -> TaskKind {
        TaskKind::Redraw(ViewId::from_raw_parts(n, 0))
    }

    #[test]
    fn test_push_back_twice_links_once() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        tasks.push_back(Queue::Idle, a);
        tasks.push_back(Queue::Idle, a);
        assert_eq!(tasks.len(Queue::Idle), 1);
        assert_eq!(tasks.pending(Queue::Idle), vec![redraw(1)]);
    }

    #[test]
    fn test_unlink_is_idempotent() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        tasks.unlink(a);
        assert!(!tasks.is_linked(a));

        tasks.push_back(Queue::Idle, a);
        tasks.unlink(a);
        tasks.unlink(a);
        assert!(!tasks.is_linked(a));
        assert_eq!(tasks.len(Queue::Idle), 0);
    }

    #[test]
    fn test_insert_after_and_before() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        let b = tasks.allocate(redraw(2));
        let c = tasks.allocate(redraw(3));
        let d = tasks.allocate(redraw(4));

        tasks.push_back(Queue::Idle, a);
        tasks.push_back(Queue::Idle, c);
        assert!(tasks.insert_after(b, a));
        assert!(tasks.insert_before(d, a));
        assert_eq!(
            tasks.pending(Queue::Idle),
            vec![redraw(4), redraw(1), redraw(2), redraw(3)]
        );

        // Re-inserting moves rather than duplicates.
        assert!(tasks.insert_after(d, c));
        assert_eq!(
            tasks.pending(Queue::Idle),
            vec![redraw(1), redraw(2), redraw(3), redraw(4)]
        );
    }

    #[test]
    fn test_insert_after_unqueued_anchor_fails() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        let b = tasks.allocate(redraw(2));
        assert!(!tasks.insert_after(b, a));
        assert!(!tasks.is_linked(b));
        assert!(!tasks.insert_after(a, a));
    }

    #[test]
    fn test_flush_snapshot_excludes_late_tasks() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        let b = tasks.allocate(redraw(2));
        tasks.push_back(Queue::Idle, a);

        tasks.begin_flush(Queue::Idle);
        assert!(tasks.is_linked(a));
        assert!(!tasks.is_queued(a));

        let (id, kind) = tasks.pop_running().unwrap();
        assert_eq!((id, kind), (a, redraw(1)));
        assert!(!tasks.is_linked(a));

        // Queued while the flush runs: waits for the next pass.
        tasks.push_back(Queue::Idle, b);
        tasks.push_back(Queue::Idle, a);
        assert!(tasks.pop_running().is_none());
        assert_eq!(tasks.pending(Queue::Idle), vec![redraw(2), redraw(1)]);
    }

    #[test]
    fn test_unlink_during_flush() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        let b = tasks.allocate(redraw(2));
        let c = tasks.allocate(redraw(3));
        for t in [a, b, c] {
            tasks.push_back(Queue::Idle, t);
        }
        tasks.begin_flush(Queue::Idle);
        tasks.pop_running();
        tasks.unlink(b);
        assert_eq!(tasks.pop_running().map(|(id, _)| id), Some(c));
        assert!(tasks.pop_running().is_none());
    }

    #[test]
    fn test_release_invalidates_id() {
        let mut tasks = TaskQueue::new();
        let a = tasks.allocate(redraw(1));
        tasks.push_back(Queue::Commit, a);
        tasks.release(a);
        assert!(!tasks.contains(a));
        assert_eq!(tasks.len(Queue::Commit), 0);

        let b = tasks.allocate(redraw(2));
        assert_ne!(a, b);
        tasks.unlink(a);
        tasks.push_back(Queue::Idle, a);
        assert!(tasks.is_empty());
        assert!(!tasks.is_linked(b));
    }
}
