//! Arena-backed red-black tree.
//!
//! Balancing follows the classic sentinel formulation: absent links point at
//! [`SENTINEL`], whose color is black and whose parent link is scratch space
//! written during deletion.

use std::marker::PhantomData;

use thiserror::Error;

use crate::RbKey;

/// Handle to a node slot in an [`ExtentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// The shared leaf. Never handed out by `insert`.
pub const SENTINEL: NodeId = NodeId(0);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

/// Descent rule used by insertion.
///
/// `goes_left` decides whether a new node with `(key, id)` belongs in the
/// left subtree of an existing node with `(node_key, node_id)`.
pub trait OrderPolicy {
    fn goes_left(key: RbKey, id: NodeId, node_key: RbKey, node_id: NodeId) -> bool;

    /// Whether `a` must not come after `b` in an in-order walk.
    /// Used by [`ExtentTree::check_invariants`].
    fn in_order(a: (RbKey, NodeId), b: (RbKey, NodeId)) -> bool {
        !Self::goes_left(b.0, b.1, a.0, a.1)
    }
}

/// Plain key order; equal keys ordered by slot identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyThenIdentity;

impl OrderPolicy for KeyThenIdentity {
    #[inline]
    fn goes_left(key: RbKey, id: NodeId, node_key: RbKey, node_id: NodeId) -> bool {
        key < node_key || (key == node_key && id < node_id)
    }
}

/// Modular order for wrapping keys. Valid while live keys span less than
/// half the key space.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrappingTimer;

impl OrderPolicy for WrappingTimer {
    #[inline]
    fn goes_left(key: RbKey, _id: NodeId, node_key: RbKey, _node_id: NodeId) -> bool {
        (key.wrapping_sub(node_key) as isize) < 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeInvariantError {
    #[error("root {0:?} is red")]
    RedRoot(NodeId),
    #[error("sentinel is red")]
    RedSentinel,
    #[error("red node {0:?} has a red child")]
    RedRedEdge(NodeId),
    #[error("black height differs below {0:?}")]
    BlackHeightMismatch(NodeId),
    #[error("child {0:?} does not point back to its parent")]
    BrokenParentLink(NodeId),
    #[error("node {0:?} is out of order")]
    OrderViolation(NodeId),
    #[error("tree reaches {reachable} nodes but holds {len}")]
    LengthMismatch { reachable: usize, len: usize },
}

#[derive(Debug, Clone)]
struct Node<V> {
    key: RbKey,
    left: NodeId,
    right: NodeId,
    parent: NodeId,
    color: Color,
    /// `None` for the sentinel and for free slots.
    value: Option<V>,
}

impl<V> Node<V> {
    const fn sentinel() -> Self {
        Self {
            key: 0,
            left: SENTINEL,
            right: SENTINEL,
            parent: SENTINEL,
            color: Color::Black,
            value: None,
        }
    }
}

/// Red-black tree over word-sized keys with values of type `V`.
#[derive(Debug, Clone)]
pub struct ExtentTree<V, P: OrderPolicy = KeyThenIdentity> {
    nodes: Vec<Node<V>>,
    free: Vec<NodeId>,
    root: NodeId,
    len: usize,
    _policy: PhantomData<P>,
}

impl<V, P: OrderPolicy> Default for ExtentTree<V, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, P: OrderPolicy> ExtentTree<V, P> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity + 1);
        nodes.push(Node::sentinel());
        Self {
            nodes,
            free: Vec::new(),
            root: SENTINEL,
            len: 0,
            _policy: PhantomData,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Key of a live node.
    #[must_use]
    pub fn key(&self, id: NodeId) -> Option<RbKey> {
        self.live(id).map(|node| node.key)
    }

    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&V> {
        self.live(id).and_then(|node| node.value.as_ref())
    }

    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut V> {
        if id.is_sentinel() {
            return None;
        }
        self.nodes.get_mut(id.index()).and_then(|node| node.value.as_mut())
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.live(id).is_some()
    }

    /// Leftmost node, `None` when empty.
    #[must_use]
    pub fn min(&self) -> Option<NodeId> {
        if self.root.is_sentinel() {
            return None;
        }
        Some(self.subtree_min(self.root))
    }

    /// In-order successor of a live node.
    #[must_use]
    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        self.live(id)?;
        let right = self.right(id);
        if !right.is_sentinel() {
            return Some(self.subtree_min(right));
        }
        let mut node = id;
        let mut parent = self.parent(node);
        while !parent.is_sentinel() && node == self.right(parent) {
            node = parent;
            parent = self.parent(node);
        }
        (!parent.is_sentinel()).then_some(parent)
    }

    #[must_use]
    pub fn iter(&self) -> InOrder<'_, V, P> {
        InOrder {
            tree: self,
            next: self.min(),
        }
    }

    /// Insert a node and rebalance. Returns the handle of the new node.
    pub fn insert(&mut self, key: RbKey, value: V) -> NodeId {
        let id = self.alloc(key, value);
        self.len += 1;

        if self.root.is_sentinel() {
            self.set_parent(id, SENTINEL);
            self.set_color(id, Color::Black);
            self.root = id;
            return id;
        }

        let mut temp = self.root;
        loop {
            let left = P::goes_left(key, id, self.nodes[temp.index()].key, temp);
            let next = if left { self.left(temp) } else { self.right(temp) };
            if next.is_sentinel() {
                if left {
                    self.set_left(temp, id);
                } else {
                    self.set_right(temp, id);
                }
                self.set_parent(id, temp);
                break;
            }
            temp = next;
        }

        self.insert_fixup(id);
        id
    }

    /// Unlink a node and rebalance. Returns its value, or `None` when `id`
    /// is not a live node.
    pub fn delete(&mut self, node: NodeId) -> Option<V> {
        self.live(node)?;

        let (subst, temp) = if self.left(node).is_sentinel() {
            (node, self.right(node))
        } else if self.right(node).is_sentinel() {
            (node, self.left(node))
        } else {
            let subst = self.subtree_min(self.right(node));
            (subst, self.right(subst))
        };

        if subst == self.root {
            self.root = temp;
            self.set_color(temp, Color::Black);
            if !temp.is_sentinel() {
                self.set_parent(temp, SENTINEL);
            }
            return self.release(node);
        }

        let subst_was_red = self.is_red(subst);
        let subst_parent = self.parent(subst);
        if subst == self.left(subst_parent) {
            self.set_left(subst_parent, temp);
        } else {
            self.set_right(subst_parent, temp);
        }

        if subst == node {
            self.set_parent(temp, subst_parent);
        } else {
            if subst_parent == node {
                self.set_parent(temp, subst);
            } else {
                self.set_parent(temp, subst_parent);
            }

            let (left, right, parent, color) = {
                let n = &self.nodes[node.index()];
                (n.left, n.right, n.parent, n.color)
            };
            self.set_left(subst, left);
            self.set_right(subst, right);
            self.set_parent(subst, parent);
            self.set_color(subst, color);

            if node == self.root {
                self.root = subst;
            } else if node == self.left(parent) {
                self.set_left(parent, subst);
            } else {
                self.set_right(parent, subst);
            }

            let left = self.left(subst);
            if !left.is_sentinel() {
                self.set_parent(left, subst);
            }
            let right = self.right(subst);
            if !right.is_sentinel() {
                self.set_parent(right, subst);
            }
        }

        let value = self.release(node);
        if !subst_was_red {
            self.delete_fixup(temp);
        }
        value
    }

    /// Verify coloring, black height, parent links and order.
    /// Returns the black height of the tree.
    pub fn check_invariants(&self) -> Result<usize, TreeInvariantError> {
        if self.nodes[SENTINEL.index()].color != Color::Black {
            return Err(TreeInvariantError::RedSentinel);
        }
        if self.is_red(self.root) {
            return Err(TreeInvariantError::RedRoot(self.root));
        }
        if !self.root.is_sentinel() && !self.parent(self.root).is_sentinel() {
            return Err(TreeInvariantError::BrokenParentLink(self.root));
        }
        let (height, reachable) = self.check_subtree(self.root)?;
        if reachable != self.len {
            return Err(TreeInvariantError::LengthMismatch {
                reachable,
                len: self.len,
            });
        }

        let mut prev: Option<NodeId> = None;
        for id in self.iter().map(|(id, _, _)| id) {
            if let Some(p) = prev {
                let a = (self.nodes[p.index()].key, p);
                let b = (self.nodes[id.index()].key, id);
                if !P::in_order(a, b) {
                    return Err(TreeInvariantError::OrderViolation(id));
                }
            }
            prev = Some(id);
        }
        Ok(height)
    }

    fn check_subtree(&self, id: NodeId) -> Result<(usize, usize), TreeInvariantError> {
        if id.is_sentinel() {
            return Ok((1, 0));
        }
        let left = self.left(id);
        let right = self.right(id);
        for child in [left, right] {
            if child.is_sentinel() {
                continue;
            }
            if self.parent(child) != id {
                return Err(TreeInvariantError::BrokenParentLink(child));
            }
            if self.is_red(id) && self.is_red(child) {
                return Err(TreeInvariantError::RedRedEdge(id));
            }
        }
        let (lh, ln) = self.check_subtree(left)?;
        let (rh, rn) = self.check_subtree(right)?;
        if lh != rh {
            return Err(TreeInvariantError::BlackHeightMismatch(id));
        }
        let own = usize::from(!self.is_red(id));
        Ok((lh + own, ln + rn + 1))
    }

    fn insert_fixup(&mut self, mut node: NodeId) {
        while node != self.root && self.is_red(self.parent(node)) {
            let parent = self.parent(node);
            let grand = self.parent(parent);
            if parent == self.left(grand) {
                let uncle = self.right(grand);
                if self.is_red(uncle) {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grand, Color::Red);
                    node = grand;
                } else {
                    if node == self.right(parent) {
                        node = parent;
                        self.rotate_left(node);
                    }
                    let parent = self.parent(node);
                    let grand = self.parent(parent);
                    self.set_color(parent, Color::Black);
                    self.set_color(grand, Color::Red);
                    self.rotate_right(grand);
                }
            } else {
                let uncle = self.left(grand);
                if self.is_red(uncle) {
                    self.set_color(parent, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(grand, Color::Red);
                    node = grand;
                } else {
                    if node == self.left(parent) {
                        node = parent;
                        self.rotate_right(node);
                    }
                    let parent = self.parent(node);
                    let grand = self.parent(parent);
                    self.set_color(parent, Color::Black);
                    self.set_color(grand, Color::Red);
                    self.rotate_left(grand);
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    fn delete_fixup(&mut self, mut temp: NodeId) {
        while temp != self.root && !self.is_red(temp) {
            let parent = self.parent(temp);
            if temp == self.left(parent) {
                let mut w = self.right(parent);
                if self.is_red(w) {
                    self.set_color(w, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_left(parent);
                    w = self.right(self.parent(temp));
                }
                if !self.is_red(self.left(w)) && !self.is_red(self.right(w)) {
                    self.set_color(w, Color::Red);
                    temp = self.parent(temp);
                } else {
                    if !self.is_red(self.right(w)) {
                        let wl = self.left(w);
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.right(self.parent(temp));
                    }
                    let parent = self.parent(temp);
                    let parent_color = self.color(parent);
                    self.set_color(w, parent_color);
                    self.set_color(parent, Color::Black);
                    let wr = self.right(w);
                    self.set_color(wr, Color::Black);
                    self.rotate_left(parent);
                    temp = self.root;
                }
            } else {
                let mut w = self.left(parent);
                if self.is_red(w) {
                    self.set_color(w, Color::Black);
                    self.set_color(parent, Color::Red);
                    self.rotate_right(parent);
                    w = self.left(self.parent(temp));
                }
                if !self.is_red(self.left(w)) && !self.is_red(self.right(w)) {
                    self.set_color(w, Color::Red);
                    temp = self.parent(temp);
                } else {
                    if !self.is_red(self.left(w)) {
                        let wr = self.right(w);
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.left(self.parent(temp));
                    }
                    let parent = self.parent(temp);
                    let parent_color = self.color(parent);
                    self.set_color(w, parent_color);
                    self.set_color(parent, Color::Black);
                    let wl = self.left(w);
                    self.set_color(wl, Color::Black);
                    self.rotate_right(parent);
                    temp = self.root;
                }
            }
        }
        self.set_color(temp, Color::Black);
    }

    fn rotate_left(&mut self, node: NodeId) {
        let temp = self.right(node);
        let inner = self.left(temp);
        self.set_right(node, inner);
        if !inner.is_sentinel() {
            self.set_parent(inner, node);
        }
        let parent = self.parent(node);
        self.set_parent(temp, parent);
        if node == self.root {
            self.root = temp;
        } else if node == self.left(parent) {
            self.set_left(parent, temp);
        } else {
            self.set_right(parent, temp);
        }
        self.set_left(temp, node);
        self.set_parent(node, temp);
    }

    fn rotate_right(&mut self, node: NodeId) {
        let temp = self.left(node);
        let inner = self.right(temp);
        self.set_left(node, inner);
        if !inner.is_sentinel() {
            self.set_parent(inner, node);
        }
        let parent = self.parent(node);
        self.set_parent(temp, parent);
        if node == self.root {
            self.root = temp;
        } else if node == self.right(parent) {
            self.set_right(parent, temp);
        } else {
            self.set_left(parent, temp);
        }
        self.set_right(temp, node);
        self.set_parent(node, temp);
    }

    fn subtree_min(&self, mut id: NodeId) -> NodeId {
        while !self.left(id).is_sentinel() {
            id = self.left(id);
        }
        id
    }

    fn alloc(&mut self, key: RbKey, value: V) -> NodeId {
        let node = Node {
            key,
            left: SENTINEL,
            right: SENTINEL,
            parent: SENTINEL,
            color: Color::Red,
            value: Some(value),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = node;
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn release(&mut self, id: NodeId) -> Option<V> {
        let slot = &mut self.nodes[id.index()];
        slot.left = SENTINEL;
        slot.right = SENTINEL;
        slot.parent = SENTINEL;
        slot.color = Color::Black;
        let value = slot.value.take();
        self.free.push(id);
        self.len -= 1;
        value
    }

    fn live(&self, id: NodeId) -> Option<&Node<V>> {
        if id.is_sentinel() {
            return None;
        }
        self.nodes.get(id.index()).filter(|node| node.value.is_some())
    }

    #[inline]
    fn left(&self, id: NodeId) -> NodeId {
        self.nodes[id.index()].left
    }

    #[inline]
    fn right(&self, id: NodeId) -> NodeId {
        self.nodes[id.index()].right
    }

    #[inline]
    fn parent(&self, id: NodeId) -> NodeId {
        self.nodes[id.index()].parent
    }

    #[inline]
    fn color(&self, id: NodeId) -> Color {
        self.nodes[id.index()].color
    }

    #[inline]
    fn is_red(&self, id: NodeId) -> bool {
        self.nodes[id.index()].color == Color::Red
    }

    #[inline]
    fn set_left(&mut self, id: NodeId, child: NodeId) {
        self.nodes[id.index()].left = child;
    }

    #[inline]
    fn set_right(&mut self, id: NodeId, child: NodeId) {
        self.nodes[id.index()].right = child;
    }

    #[inline]
    fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.nodes[id.index()].parent = parent;
    }

    /// The sentinel stays black whatever the caller asks for.
    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        if id.is_sentinel() {
            return;
        }
        self.nodes[id.index()].color = color;
    }
}

/// In-order walk yielding `(id, key, value)`.
pub struct InOrder<'a, V, P: OrderPolicy> {
    tree: &'a ExtentTree<V, P>,
    next: Option<NodeId>,
}

impl<'a, V, P: OrderPolicy> Iterator for InOrder<'a, V, P> {
    type Item = (NodeId, RbKey, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.successor(id);
        let node = self.tree.live(id)?;
        Some((id, node.key, node.value.as_ref()?))
    }
}
