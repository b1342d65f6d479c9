use crate::tree::NodeRef;

/// Walks a tree one step at a time, remembering the path from the root.
///
/// Every `goto_*` method returns whether it moved, the cursor stays where it was otherwise.
#[derive(Debug, Clone)]
pub struct TreeCursor<'t> {
    path: Vec<NodeRef<'t>>,
}

impl<'t> TreeCursor<'t> {
    pub(crate) fn new(root: NodeRef<'t>) -> Self {
        Self { path: vec![root] }
    }

    pub fn node(&self) -> NodeRef<'t> {
        self.path[self.path.len() - 1]
    }

    /// 0 for the node the cursor was created on
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    fn replace(&mut self, node: Option<NodeRef<'t>>) -> bool {
        match node {
            Some(node) => {
                let last = self.path.len() - 1;
                self.path[last] = node;
                true
            }
            None => false,
        }
    }

    fn descend(&mut self, node: Option<NodeRef<'t>>) -> bool {
        match node {
            Some(node) => {
                self.path.push(node);
                true
            }
            None => false,
        }
    }

    pub fn goto_first_child(&mut self) -> bool {
        let child = self.node().first_child();
        self.descend(child)
    }

    pub fn goto_last_child(&mut self) -> bool {
        let child = self.node().last_child();
        self.descend(child)
    }

    pub fn goto_next_sibling(&mut self) -> bool {
        if self.path.len() == 1 {
            return false;
        }
        let sibling = self.node().next_sibling();
        self.replace(sibling)
    }

    pub fn goto_prev_sibling(&mut self) -> bool {
        if self.path.len() == 1 {
            return false;
        }
        let sibling = self.node().prev_sibling();
        self.replace(sibling)
    }

    pub fn goto_parent(&mut self) -> bool {
        if self.path.len() == 1 {
            return false;
        }
        self.path.pop();
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::parse_with;

    #[test]
    fn walks_depth_first() {
        let (tree, _) = parse_with("blocks", "{[1]}");
        let mut cursor = tree.cursor();
        let mut visited = Vec::new();

        'walk: loop {
            visited.push(format!("{}{}", "-".repeat(cursor.depth()), cursor.node().name()));
            if cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        assert_eq!(
            visited,
            vec![
                "Top",
                "-meta.block",
                "--punctuation.block.begin",
                "--meta.list",
                "---punctuation.list.begin",
                "---constant.numeric",
                "---punctuation.list.end",
                "--punctuation.block.end",
            ]
        );
    }

    #[test]
    fn stays_put_when_it_cannot_move() {
        let (tree, _) = parse_with("blocks", "{}");
        let mut cursor = tree.cursor();
        assert!(!cursor.goto_parent());
        assert!(!cursor.goto_next_sibling());
        assert!(cursor.goto_last_child());
        assert!(cursor.goto_last_child());
        assert_eq!(cursor.node().name(), "punctuation.block.end");
        assert!(!cursor.goto_first_child());
        assert!(cursor.goto_prev_sibling());
        assert_eq!(cursor.node().name(), "punctuation.block.begin");
        assert!(!cursor.goto_prev_sibling());
        assert_eq!(cursor.depth(), 2);
        assert!(cursor.goto_parent());
        assert_eq!(cursor.node().name(), "meta.block");
    }
}
