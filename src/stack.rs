// stack.rs - Persistent stack with shared tails.
//
// The VM clones its whole state on every checkpoint. Loop, call and capture
// stacks are linked lists of reference-counted nodes, so a clone is a
// pointer copy and a push never disturbs older snapshots.

use std::rc::Rc;

struct Node<T> {
    value: T,
    next: Link<T>,
}

type Link<T> = Option<Rc<Node<T>>>;

impl<T: Clone> Clone for Node<T> {
    fn clone(&self) -> Self {
        Node {
            value: self.value.clone(),
            next: self.next.clone(),
        }
    }
}

pub struct PStack<T> {
    head: Link<T>,
    len: usize,
}

impl<T> PStack<T> {
    pub fn new() -> Self {
        PStack { head: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: T) {
        let next = self.head.take();
        self.head = Some(Rc::new(Node { value, next }));
        self.len += 1;
    }

    pub fn peek(&self) -> Option<&T> {
        self.head.as_deref().map(|node| &node.value)
    }

    /// Iterate from the top of the stack down.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
        }
    }
}

impl<T: Clone> PStack<T> {
    pub fn pop(&mut self) -> Option<T> {
        let node = self.head.take()?;
        self.len -= 1;
        match Rc::try_unwrap(node) {
            Ok(node) => {
                self.head = node.next;
                Some(node.value)
            }
            Err(shared) => {
                self.head = shared.next.clone();
                Some(shared.value.clone())
            }
        }
    }

    /// Mutable access to the top value, copying the node if it is shared.
    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.head.as_mut().map(|node| &mut Rc::make_mut(node).value)
    }

    /// Apply `f` to the topmost value matching `pred`. Nodes above it are
    /// rebuilt; everything below stays shared. Returns false if none matched.
    pub fn update_first<P, F>(&mut self, pred: P, f: F) -> bool
    where
        P: Fn(&T) -> bool,
        F: FnOnce(&mut T),
    {
        if !self.iter().any(&pred) {
            return false;
        }
        let mut above = Vec::new();
        while let Some(top) = self.peek() {
            if pred(top) {
                break;
            }
            if let Some(value) = self.pop() {
                above.push(value);
            }
        }
        if let Some(top) = self.peek_mut() {
            f(top);
        }
        while let Some(value) = above.pop() {
            self.push(value);
        }
        true
    }
}

impl<T> Clone for PStack<T> {
    fn clone(&self) -> Self {
        PStack {
            head: self.head.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for PStack<T> {
    fn default() -> Self {
        PStack::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PStack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// Unlink iteratively; deep call stacks would otherwise recurse in drop.
impl<T> Drop for PStack<T> {
    fn drop(&mut self) {
        let mut link = self.head.take();
        while let Some(node) = link {
            match Rc::try_unwrap(node) {
                Ok(mut node) => link = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

pub struct Iter<'a, T> {
    next: Option<&'a Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| {
            self.next = node.next.as_deref();
            &node.value
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_lifo() {
        let mut s = PStack::new();
        s.push(1);
        s.push(2);
        s.push(3);
        assert_eq!(s.len(), 3);
        assert_eq!(s.pop(), Some(3));
        assert_eq!(s.pop(), Some(2));
        assert_eq!(s.peek(), Some(&1));
        assert_eq!(s.pop(), Some(1));
        assert_eq!(s.pop(), None);
        assert!(s.is_empty());
    }

    #[test]
    fn snapshots_are_independent() {
        let mut s = PStack::new();
        s.push("a".to_string());
        let snapshot = s.clone();
        s.push("b".to_string());
        *s.peek_mut().unwrap() = "c".to_string();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.peek().map(String::as_str), Some("a"));
        assert_eq!(s.iter().cloned().collect::<Vec<_>>(), vec!["c", "a"]);
    }

    #[test]
    fn peek_mut_on_shared_node_copies() {
        let mut s = PStack::new();
        s.push(10);
        let snapshot = s.clone();
        *s.peek_mut().unwrap() += 1;
        assert_eq!(s.peek(), Some(&11));
        assert_eq!(snapshot.peek(), Some(&10));
    }

    #[test]
    fn update_first_reaches_below_top() {
        let mut s = PStack::new();
        s.push(1);
        s.push(20);
        s.push(3);
        let snapshot = s.clone();
        assert!(s.update_first(|v| *v >= 10, |v| *v += 5));
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), vec![3, 25, 1]);
        assert_eq!(snapshot.iter().copied().collect::<Vec<_>>(), vec![3, 20, 1]);
        assert!(!s.update_first(|v| *v > 100, |v| *v = 0));
    }

    #[test]
    fn deep_stack_drops() {
        let mut s = PStack::new();
        for i in 0..200_000 {
            s.push(i);
        }
        drop(s);
    }
}
