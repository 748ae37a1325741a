//! Per-method trie node (spec.md §4.3 "Build per-method tries"). Three
//! edge kinds out of every node: one map of static children, at most one
//! parameter child, at most one wildcard child — walked in that priority
//! order with backtracking so a deeper static match can still win over a
//! shallower parameter/wildcard that also matched (longest-match).

use std::collections::HashMap;

use super::{PathParams, Segment};

pub struct Node<T> {
    value: Option<T>,
    static_children: HashMap<String, Node<T>>,
    param_child: Option<(String, Box<Node<T>>)>,
    wildcard_value: Option<T>,
}

impl<T> Node<T> {
    pub fn new() -> Self {
        Self { value: None, static_children: HashMap::new(), param_child: None, wildcard_value: None }
    }

    pub fn insert(&mut self, segments: &[Segment], value: T) {
        match segments.first() {
            None => self.value = Some(value),
            Some(Segment::Static(s)) => {
                self.static_children.entry(s.clone()).or_insert_with(Node::new).insert(&segments[1..], value);
            }
            Some(Segment::Param(name)) => {
                let child = self.param_child.get_or_insert_with(|| (name.clone(), Box::new(Node::new())));
                child.1.insert(&segments[1..], value);
            }
            Some(Segment::Wildcard) => {
                self.wildcard_value = Some(value);
            }
        }
    }

    /// Match the remaining path parts against this node, preferring
    /// static > param > wildcard at every level, backtracking when a
    /// branch taken greedily turns out not to lead to a value at the leaf
    /// (spec.md §4.3 "a deeper static match... wins").
    pub fn matched<'a>(&'a self, parts: &[&str], params: &mut PathParams) -> Option<&'a T> {
        let Some((head, rest)) = parts.split_first() else {
            return self.value.as_ref();
        };

        if let Some(child) = self.static_children.get(*head) {
            if let Some(v) = child.matched(rest, params) {
                return Some(v);
            }
        }

        if let Some((name, child)) = &self.param_child {
            let mut attempt = params.clone();
            attempt.insert(name.clone(), (*head).to_owned());
            if let Some(v) = child.matched(rest, &mut attempt) {
                *params = attempt;
                return Some(v);
            }
        }

        if let Some(value) = &self.wildcard_value {
            params.insert("*".to_owned(), parts.join("/"));
            return Some(value);
        }

        None
    }
}
