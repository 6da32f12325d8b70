//! Bounded ancestor chain behind the current working directory.

use heapless::{String, Vec};

use crate::{MAX_DIR_DEPTH, PATH_MAX, SHORT_NAME_MAX};

#[derive(Clone)]
pub struct Ancestor<D> {
    pub dir: D,
    pub name: String<SHORT_NAME_MAX>,
}

/// Current directory plus the chain of directories entered to reach it.
/// The chain length always equals the nesting depth; the root carries an
/// empty name. `enter` at capacity is refused so `up` can always unwind
/// exactly what was entered.
#[derive(Clone)]
pub struct WorkDir<D> {
    current: D,
    current_name: String<SHORT_NAME_MAX>,
    ancestors: Vec<Ancestor<D>, MAX_DIR_DEPTH>,
}

impl<D: Clone> WorkDir<D> {
    pub fn new_root(root: D) -> Self {
        Self {
            current: root,
            current_name: String::new(),
            ancestors: Vec::new(),
        }
    }

    pub fn current(&self) -> &D {
        &self.current
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn at_capacity(&self) -> bool {
        self.ancestors.is_full()
    }

    /// Make `dir` current, pushing the previous current onto the chain.
    /// Fails without mutating when the chain is full or the name does not
    /// fit a short-name slot.
    pub fn enter(&mut self, dir: D, name: &str) -> Result<(), ()> {
        if self.ancestors.is_full() || name.len() > SHORT_NAME_MAX {
            return Err(());
        }
        let mut new_name: String<SHORT_NAME_MAX> = String::new();
        new_name.push_str(name)?;
        let prev_dir = core::mem::replace(&mut self.current, dir);
        let prev_name = core::mem::replace(&mut self.current_name, new_name);
        self.ancestors
            .push(Ancestor {
                dir: prev_dir,
                name: prev_name,
            })
            .map_err(|_| ())
    }

    /// Pop back to the most recent ancestor; `false` when already at root.
    pub fn up(&mut self) -> bool {
        match self.ancestors.pop() {
            Some(ancestor) => {
                self.current = ancestor.dir;
                self.current_name = ancestor.name;
                true
            }
            None => false,
        }
    }

    /// Absolute path of the current directory, `"/"` at root. `None` only
    /// if the chain outgrows the path buffer, which the depth and name
    /// bounds rule out for well-formed chains.
    pub fn path(&self) -> Option<String<PATH_MAX>> {
        let mut out: String<PATH_MAX> = String::new();
        out.push('/').ok()?;
        for ancestor in self.ancestors.iter() {
            if ancestor.name.is_empty() {
                continue;
            }
            out.push_str(ancestor.name.as_str()).ok()?;
            out.push('/').ok()?;
        }
        if !self.current_name.is_empty() {
            out.push_str(self.current_name.as_str()).ok()?;
        }
        Some(out)
    }
}
