// ==============================================================================
// route.rs — TARGET NODES + ROUTE (ORDERED WAYPOINT ARENA)
// ------------------------------------------------------------------------------
// The route owns its nodes in push order. Adjacency is stored as indices into
// that vector (prev/next), never as shared pointers, so a closed loop is just
// "last.next == 0 && first.prev == last".
//
// Closure is a proximity heuristic: first and last node closer than
// CLOSE_DIST in BOTH axes (exclusive), not an exact coincidence test.
// ==============================================================================

use rapier3d::prelude::{Point, Real};

/// Endpoint distance (per axis, exclusive) under which a route counts as closed.
pub const CLOSE_DIST: Real = 32.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TargetNode {
    location: Point<Real>,
    size: (Real, Real), // capture width / height
    index: i32,         // -1 => not on the route
    prev: Option<usize>,
    next: Option<usize>,
}

impl TargetNode {
    pub fn new(location: Point<Real>, size: (Real, Real), index: i32) -> Self {
        Self { location, size, index, prev: None, next: None }
    }

    /// A node that is not (yet) part of any route.
    pub fn unassigned(location: Point<Real>, size: (Real, Real)) -> Self {
        Self::new(location, size, -1)
    }

    pub fn location(&self) -> Point<Real> {
        self.location
    }

    pub fn size(&self) -> (Real, Real) {
        self.size
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn set_index(&mut self, index: i32) {
        self.index = index;
    }

    pub fn prev(&self) -> Option<usize> {
        self.prev
    }

    pub fn next(&self) -> Option<usize> {
        self.next
    }

    /// Whether `p` lies inside the capture rectangle grown by `tolerance`.
    pub fn captures(&self, p: Point<Real>, tolerance: Real) -> bool {
        let hw = self.size.0 * 0.5 + tolerance;
        let hh = self.size.1 * 0.5 + tolerance;
        (p.x - self.location.x).abs() <= hw && (p.y - self.location.y).abs() <= hh
    }
}

#[derive(Debug, Clone, Default)]
pub struct Route {
    nodes: Vec<TargetNode>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Append `node` with the next sequential index.
    /// Returns whether the route is closed afterwards.
    pub fn push(&mut self, mut node: TargetNode) -> bool {
        let index = self.nodes.len();
        node.set_index(index as i32);
        node.next = None;
        node.prev = index.checked_sub(1);

        if let Some(last) = self.nodes.last_mut() {
            last.next = Some(index);
        }
        // a previously closed loop is reopened by appending
        if let Some(first) = self.nodes.first_mut() {
            first.prev = None;
        }
        self.nodes.push(node);

        let closed = self.is_closed();
        if closed {
            let last = self.nodes.len() - 1;
            self.nodes[last].next = Some(0);
            self.nodes[0].prev = Some(last);
        }
        closed
    }

    /// Rebuild from nodes carrying persisted indices. Nodes are stable-sorted
    /// by index; negative indices are dropped.
    pub fn build_from_vector(&mut self, mut nodes: Vec<TargetNode>) {
        self.clear();
        nodes.sort_by_key(|n| n.index);
        for node in nodes.into_iter().filter(|n| n.index >= 0) {
            self.push(node);
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Out-of-range indices are a caller bug: loud in debug builds, `None`
    /// in release.
    pub fn get(&self, index: usize) -> Option<&TargetNode> {
        debug_assert!(index < self.nodes.len(), "route index {index} out of {}", self.nodes.len());
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[TargetNode] {
        &self.nodes
    }

    /// Index following `index` on the lap, wrapping at the end.
    pub fn wrap_next(&self, index: usize) -> usize {
        if self.nodes.is_empty() { 0 } else { (index + 1) % self.nodes.len() }
    }

    /// Index preceding `index` on the lap, wrapping at the start.
    pub fn wrap_prev(&self, index: usize) -> usize {
        let n = self.nodes.len();
        if n == 0 { 0 } else { (index + n - 1) % n }
    }

    /// Sum of segment lengths including the closing segment. Each segment is
    /// truncated to an integer before summing.
    pub fn geometric_length(&self) -> u32 {
        let n = self.nodes.len();
        (0..n)
            .map(|i| {
                let a = self.nodes[i].location;
                let b = self.nodes[(i + 1) % n].location;
                let (dx, dy) = (b.x - a.x, b.y - a.y);
                (dx * dx + dy * dy).sqrt() as u32
            })
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        if self.nodes.len() < 2 {
            return false;
        }
        let first = self.nodes[0].location;
        let last = self.nodes[self.nodes.len() - 1].location;
        (first.x - last.x).abs() < CLOSE_DIST && (first.y - last.y).abs() < CLOSE_DIST
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rapier3d::prelude::point;

    fn node(x: Real, y: Real, index: i32) -> TargetNode {
        TargetNode::new(point![x, y, 0.0], (256.0, 256.0), index)
    }

    #[test]
    fn push_assigns_sequential_indices() {
        let mut route = Route::new();
        for i in 0..4 {
            route.push(TargetNode::unassigned(point![i as Real * 100.0, 0.0, 0.0], (1.0, 1.0)));
        }
        let indices: Vec<i32> = route.nodes().iter().map(|n| n.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(route.get(1).and_then(|n| n.prev()), Some(0));
        assert_eq!(route.get(1).and_then(|n| n.next()), Some(2));
        assert_eq!(route.get(3).and_then(|n| n.next()), None);
    }

    #[test]
    fn single_node_is_never_closed() {
        let mut route = Route::new();
        assert!(!route.push(node(0.0, 0.0, -1)));
        assert!(!route.is_closed());
    }

    #[test]
    fn closing_push_links_the_loop() {
        let mut route = Route::new();
        assert!(!route.push(node(0.0, 0.0, -1)));
        assert!(!route.push(node(300.0, 0.0, -1)));
        assert!(!route.push(node(300.0, 300.0, -1)));
        assert!(route.push(node(10.0, -10.0, -1)));
        assert_eq!(route.get(3).and_then(|n| n.next()), Some(0));
        assert_eq!(route.get(0).and_then(|n| n.prev()), Some(3));
    }

    #[test]
    fn closure_boundary_is_exclusive() {
        let mut route = Route::new();
        route.push(node(0.0, 0.0, -1));
        assert!(!route.push(node(32.0, 0.0, -1)));

        let mut route = Route::new();
        route.push(node(0.0, 0.0, -1));
        assert!(!route.push(node(0.0, -32.0, -1)));

        let mut route = Route::new();
        route.push(node(0.0, 0.0, -1));
        assert!(route.push(node(31.9, -31.9, -1)));
    }

    #[test]
    fn build_from_vector_sorts_and_filters() {
        let mut route = Route::new();
        route.build_from_vector(vec![
            node(200.0, 0.0, 2),
            node(999.0, 999.0, -1),
            node(0.0, 0.0, 0),
            node(100.0, 0.0, 1),
        ]);
        assert_eq!(route.num_nodes(), 3);
        let xs: Vec<Real> = route.nodes().iter().map(|n| n.location().x).collect();
        assert_eq!(xs, vec![0.0, 100.0, 200.0]);
        let indices: Vec<i32> = route.nodes().iter().map(|n| n.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn build_from_vector_is_stable_for_equal_indices() {
        let mut route = Route::new();
        route.build_from_vector(vec![node(1.0, 0.0, 0), node(2.0, 0.0, 0), node(3.0, 0.0, 0)]);
        let xs: Vec<Real> = route.nodes().iter().map(|n| n.location().x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn geometric_length_truncates_each_segment() {
        let mut route = Route::new();
        route.push(node(0.0, 0.0, -1));
        route.push(node(1.5, 0.0, -1));
        route.push(node(3.0, 0.0, -1));
        // 1.5 -> 1, 1.5 -> 1, closing 3.0 -> 3
        assert_eq!(route.geometric_length(), 5);

        let mut square = Route::new();
        for (x, y) in [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)] {
            square.push(node(x, y, -1));
        }
        assert_eq!(square.geometric_length(), 400);
        assert_eq!(Route::new().geometric_length(), 0);
    }

    #[test]
    fn capture_rect_respects_tolerance() {
        let n = TargetNode::new(point![128.0, 128.0, 0.0], (256.0, 256.0), 0);
        assert!(n.captures(point![0.0, 255.0, 0.0], 0.0));
        assert!(!n.captures(point![-10.0, 128.0, 0.0], 0.0));
        assert!(n.captures(point![-10.0, 128.0, 0.0], 16.0));
    }

    #[test]
    fn wrap_helpers() {
        let mut route = Route::new();
        for i in 0..3 {
            route.push(node(i as Real * 300.0, 0.0, -1));
        }
        assert_eq!(route.wrap_next(2), 0);
        assert_eq!(route.wrap_prev(0), 2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn out_of_range_get_asserts_in_debug() {
        let route = Route::new();
        let _ = route.get(0);
    }

    proptest! {
        #[test]
        fn closure_matches_per_axis_threshold(dx in -64.0f32..64.0, dy in -64.0f32..64.0) {
            let mut route = Route::new();
            route.push(node(500.0, 500.0, -1));
            let closed = route.push(node(500.0 + dx, 500.0 + dy, -1));
            let expected = (500.0 + dx - 500.0).abs() < CLOSE_DIST && (500.0 + dy - 500.0).abs() < CLOSE_DIST;
            prop_assert_eq!(closed, expected);
        }
    }
}
