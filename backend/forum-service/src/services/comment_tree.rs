//! Reply tree reconstruction from flat parent-pointer rows
//!
//! Sibling order always equals input order. Rows whose parent is absent from
//! the input are dropped along with their replies; duplicate ids keep the
//! first occurrence. The build is iterative. Nesting stops at
//! [`MAX_REPLY_DEPTH`] reply levels: anything deeper is attached, in thread
//! order, as a direct reply of its ancestor one level above the cap and keeps its own
//! `parent_comment_id`, so serializing or dropping a tree never recurses
//! further than the cap.

use crate::domain::Comment;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Reply levels below a top-level comment before threads are flattened
pub const MAX_REPLY_DEPTH: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, itself included
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.replies.iter());
        }
        total
    }
}

pub fn build_comment_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(comments.len());
    let mut rows: Vec<Option<Comment>> = Vec::with_capacity(comments.len());
    for comment in comments {
        if index.contains_key(&comment.id) {
            continue;
        }
        index.insert(comment.id, rows.len());
        rows.push(Some(comment));
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    for (position, row) in rows.iter().enumerate() {
        let Some(comment) = row else { continue };
        match comment.parent_comment_id {
            None => roots.push(position),
            Some(parent_id) => {
                if let Some(&parent) = index.get(&parent_id) {
                    children[parent].push(position);
                }
            }
        }
    }

    // Pre-order from the roots reaches exactly the rows with an unbroken
    // ancestor chain; orphans and cycles never appear in it. Rows below the
    // cap hang off their ancestor at the cap, in pre-order.
    let mut order = Vec::with_capacity(rows.len());
    let mut attached: Vec<Vec<usize>> = vec![Vec::new(); rows.len()];
    let mut stack: Vec<(usize, usize, Option<usize>)> =
        roots.iter().rev().map(|&root| (root, 0, None)).collect();
    while let Some((position, depth, parent)) = stack.pop() {
        order.push(position);
        if let Some(parent) = parent {
            attached[parent].push(position);
        }
        let reply_parent = if depth < MAX_REPLY_DEPTH {
            Some(position)
        } else {
            parent
        };
        let reply_depth = (depth + 1).min(MAX_REPLY_DEPTH + 1);
        stack.extend(
            children[position]
                .iter()
                .rev()
                .map(|&child| (child, reply_depth, reply_parent)),
        );
    }

    let mut built: Vec<Option<CommentNode>> = (0..rows.len()).map(|_| None).collect();
    for &position in order.iter().rev() {
        let replies = attached[position]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        if let Some(comment) = rows[position].take() {
            built[position] = Some(CommentNode { comment, replies });
        }
    }

    roots
        .into_iter()
        .filter_map(|position| built[position].take())
        .collect()
}
