//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::async_effect;
///
/// async_effect! {
///     Some(match api.create_order(&request).await {
///         Ok(order) => CheckoutAction::OrderCreated { order_id: order.id },
///         Err(error) => CheckoutAction::DispatchFailed { message: error.to_string() },
///     })
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

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(2),
///     action: CheckoutAction::LeaveCheckout
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        Loaded { value: i32 },
        Leave,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::Loaded { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[tokio::test]
    async fn test_async_effect_resolves_action() {
        let Effect::Future(future) = async_effect!(Some(TestAction::Loaded { value: 7 })) else {
            unreachable!("async_effect! always builds a future");
        };

        assert!(matches!(future.await, Some(TestAction::Loaded { value: 7 })));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(2),
            action: TestAction::Leave
        };

        assert!(matches!(
            effect,
            Effect::Delay { duration, .. } if duration == Duration::from_secs(2)
        ));
    }
}
