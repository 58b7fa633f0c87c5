//! # Gatehouse Core
//!
//! Reducer and effect abstractions shared by the gatehouse crates.
//!
//! State changes are expressed as a pure function
//! `(State, Action, Environment) → (State, Effects)`. The reducer never
//! performs I/O itself: it mutates state in place and returns effect
//! *descriptions* which the runtime executes, feeding any resulting action
//! back into the reducer.
//!
//! ```text
//! Action → Reducer → (State, Effects) → Effect Execution → More Actions
//! ```
//!
//! ## Example
//!
//! ```
//! use gatehouse_core::{async_effect, effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Clone, Debug, Default)]
//! struct LampState {
//!     on: bool,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum LampAction {
//!     Toggle,
//!     Toggled,
//! }
//!
//! struct LampReducer;
//!
//! impl Reducer for LampReducer {
//!     type State = LampState;
//!     type Action = LampAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut LampState,
//!         action: LampAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<LampAction>; 4]> {
//!         match action {
//!             LampAction::Toggle => {
//!                 state.on = !state.on;
//!                 smallvec![async_effect! { Some(LampAction::Toggled) }]
//!             },
//!             LampAction::Toggled => smallvec![Effect::None],
//!         }
//!     }
//! }
//!
//! let mut state = LampState::default();
//! let effects = LampReducer.reduce(&mut state, LampAction::Toggle, &());
//! assert!(state.on);
//! assert_eq!(effects.len(), 1);
//! ```

pub use smallvec::{smallvec, SmallVec};

/// Declarative macros for effect construction
mod effect_macros;

/// State transitions
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Turns an action into a state change plus effect descriptions.
    ///
    /// Reducers must be deterministic: given the same state and action they
    /// make the same state change and describe the same effects. Anything
    /// that talks to the outside world belongs inside a returned effect.
    pub trait Reducer {
        /// Snapshot mutated in place
        type State;

        /// Input events, including those fed back by effects
        type Action;

        /// Collaborators available to effects
        type Environment;

        /// Apply `action` to `state` and describe the follow-up work.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effect descriptions
///
/// Effects are values, not execution. A reducer returns them and the runtime
/// decides when and where they run.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Work a reducer asks the runtime to perform.
    ///
    /// Whatever action an effect produces is reduced next.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Async computation; a `Some` result is sent back to the store
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Boxed futures have no Debug.
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Returns `true` for `Effect::None`
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;

    #[derive(Clone, Debug, PartialEq)]
    enum Ping {
        Pong,
    }

    #[test]
    fn debug_output_hides_future_body() {
        let effect: Effect<Ping> = Effect::Future(Box::pin(async { Some(Ping::Pong) }));
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn only_none_is_none() {
        let future: Effect<Ping> = Effect::Future(Box::pin(async { Some(Ping::Pong) }));
        assert!(Effect::<Ping>::None.is_none());
        assert!(!future.is_none());
    }

    #[tokio::test]
    async fn future_effect_yields_action() {
        let effect: Effect<Ping> = Effect::Future(Box::pin(async { Some(Ping::Pong) }));
        let Effect::Future(fut) = effect else {
            unreachable!("constructed as a future");
        };
        assert_eq!(fut.await, Some(Ping::Pong));
    }
}
