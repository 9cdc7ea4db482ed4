use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
};

use crate::api::{Comment, CommentId};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,

    /// Direct replies, oldest first
    pub replies: Vec<CommentNode>,
}

/// Threaded view of the comments of one article
///
/// Roots are sorted newest first and replies oldest first, with ties broken
/// by comment id so that building is deterministic whatever the input order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentTree {
    pub roots: Vec<CommentNode>,
}

impl CommentTree {
    pub fn build(comments: &[Comment]) -> CommentTree {
        let known = comments.iter().map(|c| c.id).collect::<HashSet<_>>();
        let mut roots = Vec::new();
        let mut children = HashMap::<CommentId, Vec<&Comment>>::new();
        for c in comments {
            match c.parent_id {
                None => roots.push(c),
                Some(parent) if parent != c.id && known.contains(&parent) => {
                    children.entry(parent).or_insert_with(Vec::new).push(c)
                }
                Some(parent) => {
                    // Also show it as a top-level comment, rather than losing it
                    tracing::warn!(comment = %c.id, %parent, "comment parent not found");
                    roots.push(c);
                }
            }
        }

        roots.sort_unstable_by_key(|c| (Reverse(c.created_at), c.id));
        for replies in children.values_mut() {
            replies.sort_unstable_by_key(|c| (c.created_at, c.id));
        }

        // Build bottom-up with an explicit stack, so that deep threads do not
        // exhaust the call stack
        let mut res = Vec::with_capacity(roots.len());
        for root in roots {
            let mut stack = vec![(
                root,
                children.remove(&root.id).unwrap_or_default().into_iter(),
                Vec::new(),
            )];
            while let Some((_, pending, _)) = stack.last_mut() {
                if let Some(reply) = pending.next() {
                    let grandchildren = children.remove(&reply.id).unwrap_or_default();
                    stack.push((reply, grandchildren.into_iter(), Vec::new()));
                    continue;
                }
                let Some((comment, _, replies)) = stack.pop() else {
                    break;
                };
                let node = CommentNode {
                    comment: comment.clone(),
                    replies,
                };
                match stack.last_mut() {
                    Some((_, _, siblings)) => siblings.push(node),
                    None => res.push(node),
                }
            }
        }

        if !children.is_empty() {
            tracing::warn!(
                num_unreachable = children.values().map(|c| c.len()).sum::<usize>(),
                "comments form a parent cycle and were not threaded"
            );
        }

        CommentTree { roots: res }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of comments in the whole tree
    pub fn len(&self) -> usize {
        self.flatten().len()
    }

    /// Comments in render order, along with their nesting depth
    pub fn flatten(&self) -> Vec<(usize, &Comment)> {
        let mut res = Vec::new();
        let mut stack = self.roots.iter().rev().map(|n| (0, n)).collect::<Vec<_>>();
        while let Some((depth, node)) = stack.pop() {
            res.push((depth, &node.comment));
            stack.extend(node.replies.iter().rev().map(|r| (depth + 1, r)));
        }
        res
    }

    pub fn find(&self, id: &CommentId) -> Option<&CommentNode> {
        let mut stack = self.roots.iter().collect::<Vec<_>>();
        while let Some(node) = stack.pop() {
            if node.comment.id == *id {
                return Some(node);
            }
            stack.extend(node.replies.iter());
        }
        None
    }
}
