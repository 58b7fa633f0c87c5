//! # Gatehouse Testing
//!
//! Helpers for testing reducers without a running store:
//!
//! - [`ReducerTest`]: Given-When-Then harness around a single `reduce` call
//! - [`effects::run_effects`]: drives returned effects to completion and
//!   collects the actions they would feed back
//! - [`assertions`]: shape checks for effect lists
//! - [`init_test_tracing`]: opt-in log output for a test run
//!
//! ## Example
//!
//! ```ignore
//! use gatehouse_testing::{ReducerTest, effects::run_effects};
//!
//! #[tokio::test]
//! async fn initialize_requests_session() {
//!     let env = test_environment();
//!     let mut state = SessionState::default();
//!     let effects = SessionReducer::new().reduce(&mut state, SessionAction::Initialize, &env);
//!
//!     let actions = run_effects(effects).await;
//!     assert!(matches!(actions[0], SessionAction::SessionResolved { .. }));
//! }
//! ```


pub use reducer_test::{ReducerTest, assertions};

/// Drive effect descriptions outside a store
pub mod effects {
    use futures::future::join_all;
    use gatehouse_core::effect::Effect;

    /// Execute effects and return every action they produce
    ///
    /// Produced actions are *not* reduced; the caller decides whether to feed
    /// them back. Effects run concurrently, as they would in a store, and
    /// their actions appear in declaration order regardless of completion
    /// order.
    pub async fn run_effects<A, I>(effects: I) -> Vec<A>
    where
        I: IntoIterator<Item = Effect<A>>,
    {
        join_all(effects.into_iter().map(run_effect))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Execute a single effect
    pub async fn run_effect<A>(effect: Effect<A>) -> Option<A> {
        match effect {
            Effect::None => None,
            Effect::Future(fut) => fut.await,
        }
    }
}

/// Install a fmt subscriber honouring `RUST_LOG`, once per process
///
/// Output goes through the test writer so it is captured unless the test
/// fails or `--nocapture` is passed.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::effects::{run_effect, run_effects};
    use gatehouse_core::effect::Effect;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        First,
        Second,
        Third,
    }

    #[tokio::test]
    async fn actions_keep_declaration_order() {
        let effects: Vec<Effect<Step>> = vec![
            Effect::Future(Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Some(Step::First)
            })),
            Effect::None,
            Effect::Future(Box::pin(async { None })),
            Effect::Future(Box::pin(async { Some(Step::Second) })),
        ];

        assert_eq!(run_effects(effects).await, vec![Step::First, Step::Second]);
    }

    #[tokio::test]
    async fn single_effect_yields_its_action() {
        assert_eq!(run_effect::<Step>(Effect::None).await, None);
        let third: Effect<Step> = Effect::Future(Box::pin(async { Some(Step::Third) }));
        assert_eq!(run_effect(third).await, Some(Step::Third));
    }

    #[test]
    fn init_test_tracing_is_idempotent() {
        super::init_test_tracing();
        super::init_test_tracing();
    }
}
