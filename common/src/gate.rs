//! Mutual-exclusion gate for asynchronous actions.
//!
//! A [`Gate`] owns a piece of state and admits exactly one action at a time
//! to it. Waiters are queued in arrival order. An action that fails, whether
//! by returning an error or by panicking, only affects its own invoker; the
//! next waiter is admitted as usual.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, MutexGuard};

/// Serializes asynchronous access to `T`.
///
/// # Example
///
/// ```
/// use common::Gate;
/// use futures::FutureExt;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = Gate::new(Vec::<u32>::new());
/// let len = gate
///     .run_locked(|items| {
///         async move {
///             items.push(7);
///             items.len()
///         }
///         .boxed()
///     })
///     .await;
/// assert_eq!(len, 1);
/// # }
/// ```
#[derive(Debug)]
pub struct Gate<T> {
    state: Mutex<T>,
    held: AtomicBool,
}

impl<T: Send> Gate<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            held: AtomicBool::new(false),
        }
    }

    /// Runs `action` with exclusive access to the guarded state.
    ///
    /// If the gate is held, the caller waits until every earlier holder has
    /// finished. The action's result, including an error, is returned only to
    /// this caller.
    pub async fn run_locked<R, F>(&self, action: F) -> R
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R>,
    {
        let mut guard = self.lock().await;
        action(&mut *guard).await
    }

    /// Acquires the gate and returns a guard that releases it on drop.
    pub async fn lock(&self) -> GateGuard<'_, T> {
        let state = self.state.lock().await;
        self.held.store(true, Ordering::Release);
        GateGuard {
            held: &self.held,
            state,
        }
    }

    /// Returns whether an action currently holds the gate.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Consumes the gate, returning the guarded state.
    pub fn into_inner(self) -> T {
        self.state.into_inner()
    }
}

/// Exclusive access to the state behind a [`Gate`].
pub struct GateGuard<'a, T> {
    held: &'a AtomicBool,
    state: MutexGuard<'a, T>,
}

impl<T> std::ops::Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T> std::ops::DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        // runs before the mutex guard field is dropped
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Probe {
        inside: AtomicUsize,
        max_inside: AtomicUsize,
        order: std::sync::Mutex<Vec<usize>>,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_admit_one_action_at_a_time() {
        // given
        let gate = Arc::new(Gate::new(0u64));
        let probe = Arc::new(Probe::default());

        // when
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let gate = gate.clone();
            let probe = probe.clone();
            tasks.push(tokio::spawn(async move {
                gate.run_locked(move |counter| {
                    async move {
                        let inside = probe.inside.fetch_add(1, Ordering::SeqCst) + 1;
                        probe.max_inside.fetch_max(inside, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        *counter += 1;
                        probe.inside.fetch_sub(1, Ordering::SeqCst);
                    }
                    .boxed()
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // then
        assert_eq!(probe.max_inside.load(Ordering::SeqCst), 1);
        let gate = Arc::into_inner(gate).unwrap();
        assert_eq!(gate.into_inner(), 32);
    }

    #[tokio::test]
    async fn should_report_error_only_to_its_invoker() {
        // given
        let gate = Gate::new(());

        // when
        let failed: Result<(), String> = gate
            .run_locked(|_| async { Err("boom".to_string()) }.boxed())
            .await;
        let next: Result<u32, String> = gate.run_locked(|_| async { Ok(5) }.boxed()).await;

        // then
        assert_eq!(failed, Err("boom".to_string()));
        assert_eq!(next, Ok(5));
    }

    #[tokio::test]
    async fn should_stay_usable_after_action_panics() {
        // given
        let gate = Arc::new(Gate::new(1u32));
        let panicking = gate.clone();

        // when
        let result = tokio::spawn(async move {
            panicking
                .run_locked::<(), _>(|_| async { panic!("action failed") }.boxed())
                .await
        })
        .await;
        let value = gate.run_locked(|v| async move { *v }.boxed()).await;

        // then
        assert!(result.unwrap_err().is_panic());
        assert_eq!(value, 1);
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn should_admit_waiters_in_arrival_order() {
        // given
        let gate = Arc::new(Gate::new(()));
        let probe = Arc::new(Probe::default());
        let guard = gate.lock().await;

        // when
        let mut tasks = Vec::new();
        for i in 0..5 {
            let gate = gate.clone();
            let probe = probe.clone();
            tasks.push(tokio::spawn(async move {
                gate.run_locked(move |_| {
                    async move {
                        probe.order.lock().unwrap().push(i);
                    }
                    .boxed()
                })
                .await
            }));
            // let the task reach the queue before spawning the next one
            tokio::task::yield_now().await;
        }
        assert!(gate.is_held());
        drop(guard);
        for task in tasks {
            task.await.unwrap();
        }

        // then
        assert_eq!(*probe.order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
