//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block body
///
/// The body is moved into an `async move` block, so every value it uses must
/// be owned (clone providers out of the environment first).
///
/// # Example
///
/// ```rust,ignore
/// use gatehouse_core::async_effect;
///
/// let profiles = env.profiles.clone();
/// async_effect! {
///     let lookup = profiles.get_profile_by_id(&identity).await;
///     Some(SessionAction::ProfileLoaded { generation, identity, lookup: lookup.into() })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug)]
    enum TestAction {
        Loaded { value: i32 },
    }

    #[test]
    fn async_effect_builds_future() {
        let value = 42;
        let effect = async_effect! {
            Some(TestAction::Loaded { value })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }
}
