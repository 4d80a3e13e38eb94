//!
//! Refinements.
//!
//! `refine` creates (once per namespace and target) an anonymous refinement module whose
//! ancestors continue into the refined module. Refinements of one namespace see each other:
//! whenever a namespace gains a refinement, the methods already defined in its refinements are
//! re-declared eagerly with a declaration context activating all of them, so lookups never
//! have to consult the namespace registry.
//!

use std::collections::HashMap;
use std::iter;
use std::sync::Arc;

use rmo_core::Visibility;

use crate::declaration::{DeclarationContext, DefaultDefinee, Refinements};
use crate::error::{Result, RubyError};
use crate::module::{ModuleKind, ModuleRef};
use crate::universe::Universe;

impl Universe {
    /// `Module#refine`: run `body` with the refinement of `target` declared in `namespace`.
    ///
    /// `body` receives the refinement module and the declaration context methods defined in it
    /// should use. Concurrent calls for the same pair share one refinement module.
    pub fn refine(
        &self,
        namespace: &ModuleRef,
        target: &ModuleRef,
        body: impl FnOnce(&ModuleRef, &Arc<DeclarationContext>) -> Result<()>,
    ) -> Result<ModuleRef> {
        if namespace.is_class() {
            return Err(RubyError::no_method_error(
                format!("undefined method `refine' for {}", namespace),
                "refine",
            ));
        }
        namespace.check_frozen()?;

        let mut created = false;
        let refinement = namespace
            .refinements
            .entry(target.clone())
            .or_insert_with(|| {
                created = true;
                self.allocate(
                    ModuleKind::Refinement {
                        refined: target.clone(),
                        namespace: Arc::downgrade(namespace),
                    },
                    Some(target.clone()),
                )
            })
            .clone();
        if created {
            tracing::debug!(namespace = %namespace, refinement = %refinement, "created refinement");
        }

        let mut refinements: Refinements = HashMap::new();
        for (refined, existing) in namespace.refinements() {
            refinements.insert(refined, Arc::from(vec![existing]));
        }
        let context = DeclarationContext::new(
            Visibility::Public,
            DefaultDefinee::Fixed(refinement.clone()),
        )
        .with_refinements(refinements);

        for (_, existing) in namespace.refinements() {
            let existing_context =
                context.with_default_definee(DefaultDefinee::Fixed(existing.clone()));
            let mut updated = 0;
            // Each entry is rewritten under its own lock.
            existing.methods.alter_all(|_, method| {
                updated += 1;
                method.with_declaration_context(&existing_context)
            });
            if updated > 0 {
                existing.methods_token.invalidate();
                tracing::trace!(refinement = %existing, updated, "redeclared refined methods");
            }
        }

        body(&refinement, &context)?;
        Ok(refinement)
    }
}

/// `using`: a context activating every refinement declared in `namespace`, ahead of the
/// refinements `context` already activates for the same modules.
pub fn using(
    context: &Arc<DeclarationContext>,
    namespace: &ModuleRef,
) -> Result<Arc<DeclarationContext>> {
    if namespace.is_class() {
        return Err(RubyError::type_error(
            "wrong argument type Class (expected Module)",
        ));
    }

    let mut refinements = context.refinements().clone();
    for (refined, refinement) in namespace.refinements() {
        let list: Vec<ModuleRef> = match refinements.get(&refined) {
            Some(active) if active.iter().any(|known| Arc::ptr_eq(known, &refinement)) => continue,
            Some(active) => iter::once(refinement)
                .chain(active.iter().cloned())
                .collect(),
            None => vec![refinement],
        };
        refinements.insert(refined, Arc::from(list));
    }

    tracing::debug!(namespace = %namespace, "activated refinements");
    Ok(context.with_refinements(refinements))
}
