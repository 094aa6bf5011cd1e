// File: src/runtime/linkage.rs
//
// Cross-component NEXT. A label with no local statement is looked up in
// the linkage table, which maps it to the component that exports it.
// Calling an export gives the same contract as a local NEXT: the outcome
// is Resumed (carry on) or Aborted (the caller stops).

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::ast::Label;
use crate::bytecode::Chunk;
use crate::runtime::context::Ctx;
use crate::runtime::machine::{AbstainMap, Machine};
use crate::runtime::nexting::{Fault, NextingStack, Outcome};

/// Something other programs can NEXT into.
pub trait Component: Send + Sync {
    fn name(&self) -> &str;

    fn exports(&self) -> Vec<Label>;

    /// Run the routine at `label` with the caller's context, on the
    /// caller's nexting stack.
    fn call(
        &self,
        label: Label,
        ctx: Ctx,
        stack: Arc<NextingStack<Ctx>>,
    ) -> BoxFuture<'static, Result<Outcome<Ctx>, Fault<Ctx>>>;
}

/// Label -> exporting component. The first component to claim a label keeps it.
#[derive(Clone, Default)]
pub struct Linkage {
    entries: HashMap<Label, Arc<dyn Component>>,
    components: Vec<Arc<dyn Component>>,
}

impl Linkage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a component; returns how many of its exports it now owns.
    pub fn link(&mut self, component: Arc<dyn Component>) -> usize {
        let mut owned = 0;
        for label in component.exports() {
            match self.entries.get(&label) {
                Some(existing) => debug!(
                    %label,
                    kept = existing.name(),
                    shadowed = component.name(),
                    "label already linked"
                ),
                None => {
                    self.entries.insert(label, Arc::clone(&component));
                    owned += 1;
                }
            }
        }
        debug!(component = component.name(), owned, "linked");
        self.components.push(component);
        owned
    }

    pub fn resolve(&self, label: Label) -> Option<Arc<dyn Component>> {
        self.entries.get(&label).cloned()
    }

    /// Every label some component exports.
    pub fn labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = self.entries.keys().copied().collect();
        labels.sort();
        labels
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linkage")
            .field("components", &self.component_names())
            .field("labels", &self.entries.len())
            .finish()
    }
}

/// A compiled INTERCAL program used as a component. Its abstain state
/// persists across calls; its own NEXTs see the linkage it was built with.
pub struct Library {
    chunk: Arc<Chunk>,
    abstain: Arc<AbstainMap>,
    linkage: Arc<Linkage>,
}

impl Library {
    pub fn new(chunk: Chunk, linkage: Linkage) -> Self {
        let abstain = Arc::new(AbstainMap::new(&chunk.abstain_defaults));
        Library { chunk: Arc::new(chunk), abstain, linkage: Arc::new(linkage) }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}

impl Component for Library {
    fn name(&self) -> &str {
        &self.chunk.name
    }

    fn exports(&self) -> Vec<Label> {
        self.chunk.exports.clone()
    }

    fn call(
        &self,
        label: Label,
        ctx: Ctx,
        stack: Arc<NextingStack<Ctx>>,
    ) -> BoxFuture<'static, Result<Outcome<Ctx>, Fault<Ctx>>> {
        let machine = Machine::new(
            Arc::clone(&self.chunk),
            Arc::clone(&self.abstain),
            Arc::clone(&self.linkage),
            stack,
        );
        async move { machine.enter(label, ctx).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::parse_source;

    struct Named(&'static str, Vec<u32>);

    impl Component for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn exports(&self) -> Vec<Label> {
            self.1.iter().filter_map(|&n| Label::new(n)).collect()
        }

        fn call(
            &self,
            _label: Label,
            ctx: Ctx,
            _stack: Arc<NextingStack<Ctx>>,
        ) -> BoxFuture<'static, Result<Outcome<Ctx>, Fault<Ctx>>> {
            futures::future::ready(Ok(Outcome::Resumed(ctx))).boxed()
        }
    }

    #[test]
    fn test_first_link_wins() {
        let mut linkage = Linkage::new();
        assert_eq!(linkage.link(Arc::new(Named("first", vec![1, 2]))), 2);
        assert_eq!(linkage.link(Arc::new(Named("second", vec![2, 3]))), 1);

        let owner = |n| linkage.resolve(Label::new(n).unwrap()).map(|c| c.name().to_string());
        assert_eq!(owner(2).as_deref(), Some("first"));
        assert_eq!(owner(3).as_deref(), Some("second"));
        assert_eq!(owner(4), None);
        assert_eq!(linkage.labels().len(), 3);
        assert_eq!(linkage.component_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_library_exports_its_labels() {
        let chunk = Compiler::new("lib.i")
            .with_politeness(false)
            .compile(parse_source("(100) DO RESUME #1\n(200) DO FORGET #1"))
            .unwrap();
        let library = Library::new(chunk, Linkage::new());
        assert_eq!(library.name(), "lib.i");
        let exported: Vec<u16> = library.exports().iter().map(|l| l.value()).collect();
        assert_eq!(exported, vec![100, 200]);
    }
}
