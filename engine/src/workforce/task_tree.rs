//! Arena-indexed sub-task tree (§3.1, §4.4). The upstream module modeled parent/children with
//! cyclic dataclass references; here every node is owned by a flat `Vec` and linked by index, so
//! the tree has no reference cycles and no lifetime to thread through agents.

use serde::Serialize;

pub type NodeId = usize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Waiting,
    Running,
    Done,
    Failed,
}

#[derive(Clone, Debug)]
pub struct TaskNode {
    pub id: NodeId,
    pub external_id: String,
    pub content: String,
    pub assigned_role: Option<String>,
    pub state: TaskState,
    pub failure_count: u32,
    pub result: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Owns every node in the tree for one turn; nodes never move once inserted, so `NodeId`s stay
/// valid for the arena's lifetime.
#[derive(Default)]
pub struct TaskArena {
    nodes: Vec<TaskNode>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_root(&mut self, content: impl Into<String>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TaskNode {
            id,
            external_id: "root".to_string(),
            content: content.into(),
            assigned_role: None,
            state: TaskState::Waiting,
            failure_count: 0,
            result: None,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn insert_child(
        &mut self,
        parent: NodeId,
        external_id: impl Into<String>,
        content: impl Into<String>,
        assigned_role: Option<String>,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TaskNode {
            id,
            external_id: external_id.into(),
            content: content.into(),
            assigned_role,
            state: TaskState::Waiting,
            failure_count: 0,
            result: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn get(&self, id: NodeId) -> &TaskNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut TaskNode {
        &mut self.nodes[id]
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn set_state(&mut self, id: NodeId, state: TaskState) {
        self.nodes[id].state = state;
    }

    pub fn all_children_terminal(&self, id: NodeId) -> bool {
        self.children_of(id)
            .iter()
            .all(|&c| matches!(self.get(c).state, TaskState::Done | TaskState::Failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_children_link_correctly() {
        let mut arena = TaskArena::new();
        let root = arena.insert_root("do the whole thing");
        let a = arena.insert_child(root, "1", "step one", None);
        let b = arena.insert_child(root, "2", "step two", Some("search_agent".into()));
        assert_eq!(arena.children_of(root), &[a, b]);
        assert_eq!(arena.get(b).assigned_role.as_deref(), Some("search_agent"));
        assert_eq!(arena.get(a).parent, Some(root));
    }

    #[test]
    fn all_children_terminal_detects_completion() {
        let mut arena = TaskArena::new();
        let root = arena.insert_root("root");
        let a = arena.insert_child(root, "1", "a", None);
        let b = arena.insert_child(root, "2", "b", None);
        assert!(!arena.all_children_terminal(root));
        arena.set_state(a, TaskState::Done);
        assert!(!arena.all_children_terminal(root));
        arena.set_state(b, TaskState::Failed);
        assert!(arena.all_children_terminal(root));
    }
}
