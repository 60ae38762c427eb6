use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{
    Action, ActionFailure, ActionKind, AddDetail, Align, BringToFront, Clear, Create, Delete,
    Distribute, ExecutionContext, Executor, Label, Message, Move, Pen, Place, Resize, Review,
    Rotate, SendToBack, SetMyView, Stack, Think, Update, UpdateTodoList,
};
use crate::stream::StreamingAction;

type SanitizeFn = fn(&StreamingAction, &mut ExecutionContext<'_>) -> Result<Action, ActionFailure>;

/// Lookup-table entry for one action kind.
#[derive(Clone, Copy)]
pub struct ActionDefinition {
    pub kind: ActionKind,
    pub sanitize: SanitizeFn,
    pub saves_to_history: bool,
    /// Incomplete frames of this kind may drive a speculative preview.
    pub previews: bool,
    pub summary: &'static str,
    pub example: &'static str,
}

impl std::fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("kind", &self.kind)
            .field("saves_to_history", &self.saves_to_history)
            .field("previews", &self.previews)
            .finish_non_exhaustive()
    }
}

fn sanitize_as<E: Executor>(
    raw: &StreamingAction,
    cx: &mut ExecutionContext<'_>,
) -> Result<Action, ActionFailure> {
    E::sanitize(raw, cx).map(Into::into)
}

fn define<E: Executor>() -> ActionDefinition {
    ActionDefinition {
        kind: E::KIND,
        sanitize: sanitize_as::<E>,
        saves_to_history: E::SAVES_TO_HISTORY,
        previews: E::PREVIEWS,
        summary: E::SUMMARY,
        example: E::EXAMPLE,
    }
}

struct Registry {
    ordered: Vec<ActionDefinition>,
    by_type: HashMap<&'static str, usize>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let ordered = vec![
        define::<Message>(),
        define::<Think>(),
        define::<Review>(),
        define::<AddDetail>(),
        define::<UpdateTodoList>(),
        define::<SetMyView>(),
        define::<Create>(),
        define::<Pen>(),
        define::<Update>(),
        define::<Label>(),
        define::<Move>(),
        define::<Resize>(),
        define::<Rotate>(),
        define::<Align>(),
        define::<Distribute>(),
        define::<Stack>(),
        define::<Place>(),
        define::<BringToFront>(),
        define::<SendToBack>(),
        define::<Delete>(),
        define::<Clear>(),
    ];
    let by_type = ordered
        .iter()
        .enumerate()
        .map(|(position, definition)| (definition.kind.as_str(), position))
        .collect();
    Registry { ordered, by_type }
});

/// Definition for a `_type` discriminator.
#[must_use]
pub fn definition(kind: &str) -> Option<&'static ActionDefinition> {
    let registry = &*REGISTRY;
    registry
        .by_type
        .get(kind)
        .map(|position| &registry.ordered[*position])
}

/// Every definition in catalogue order.
pub fn definitions() -> impl Iterator<Item = &'static ActionDefinition> {
    REGISTRY.ordered.iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_is_registered_once() {
        assert_eq!(definitions().count(), 21);
        for definition in definitions() {
            let found = super::definition(definition.kind.as_str()).expect("registered");
            assert_eq!(found.kind, definition.kind);
        }
        assert!(super::definition("teleport").is_none());
    }

    #[test]
    fn examples_name_their_own_kind() {
        for definition in definitions() {
            let example: serde_json::Value =
                serde_json::from_str(definition.example).expect("example is JSON");
            assert_eq!(example["_type"], definition.kind.as_str());
        }
    }
}
