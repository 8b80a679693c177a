//! 时间与任务运行时抽象：单调时钟，以及按命名任务聚合的等待组。
//! Time and task runtime abstraction: a monotonic clock, plus a wait group
//! over named tasks.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};
use tracing::trace;

/// A monotonic nanosecond clock over a private epoch.
///
/// Time inside the protocol is always an `i64` nanosecond count since the
/// runtime's creation. Tests drive this through tokio's paused clock, which
/// makes every timing decision in the stack deterministic.
///
/// 基于私有纪元的单调纳秒时钟。
///
/// 协议内部的时间始终是自运行时创建以来的 `i64` 纳秒计数。测试通过tokio的暂停
/// 时钟驱动它，使栈中的每个时序决策都是确定性的。
#[derive(Debug)]
pub struct Runtime {
    epoch: Instant,
}

impl Runtime {
    /// Creates a new runtime whose epoch is "now".
    /// 创建一个以“现在”为纪元的新运行时。
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch: Instant::now(),
        })
    }

    /// Returns nanoseconds elapsed since the runtime epoch.
    /// 返回自运行时纪元以来经过的纳秒数。
    pub fn now(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }

    /// Sleeps for the given number of nanoseconds.
    /// 睡眠给定的纳秒数。
    pub async fn sleep(&self, ns: i64) {
        if ns <= 0 {
            return;
        }
        tokio::time::sleep(Duration::from_nanos(ns as u64)).await;
    }
}

struct Shared {
    count: watch::Sender<usize>,
}

/// A wait group over named tasks.
///
/// Every task spawned through [`TaskGroup::go`] is registered in the group;
/// a [`Waiter`] resolves once all of them have finished. Connections use
/// one group per connection so tests can join every background task
/// deterministically.
///
/// 按命名任务聚合的等待组。
///
/// 每个通过 [`TaskGroup::go`] 派生的任务都注册在组中；当它们全部结束时
/// [`Waiter`] 完成。每个连接使用一个组，使测试可以确定性地汇合所有后台任务。
#[derive(Clone)]
pub struct TaskGroup {
    shared: Arc<Shared>,
    rx: watch::Receiver<usize>,
}

impl TaskGroup {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(0usize);
        Self {
            shared: Arc::new(Shared { count: tx }),
            rx,
        }
    }

    /// Spawns a named task registered in this group.
    /// 派生一个注册在本组中的命名任务。
    pub fn go<F>(&self, name: &'static str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.shared.count.send_modify(|n| *n += 1);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            trace!(task = name, "task started");
            future.await;
            shared.count.send_modify(|n| *n -= 1);
            trace!(task = name, "task finished");
        });
    }

    /// Returns a completion handle over all tasks of this group.
    /// 返回覆盖本组所有任务的完成句柄。
    pub fn waiter(&self) -> Waiter {
        Waiter {
            rx: self.rx.clone(),
        }
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// A completion handle that becomes signalled once every task of its
/// [`TaskGroup`] has finished.
/// 一个完成句柄，在其 [`TaskGroup`] 的每个任务都结束后被触发。
#[derive(Clone)]
pub struct Waiter {
    rx: watch::Receiver<usize>,
}

impl Waiter {
    /// Waits until all tasks of the group have finished.
    /// 等待直到组中所有任务结束。
    pub async fn wait(mut self) {
        // A closed channel means the group and all its tasks are gone,
        // which also counts as completion.
        let _ = self.rx.wait_for(|n| *n == 0).await;
    }
}

/// Joins several waiters: resolves once every one of them has resolved.
/// The equivalent of a conjunction over completion handles.
/// 汇合多个等待句柄：当其中每一个都完成时才完成。相当于完成句柄上的合取。
pub async fn join_all<I>(waiters: I)
where
    I: IntoIterator<Item = Waiter>,
{
    for w in waiters {
        w.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clock_is_monotonic() {
        let run = Runtime::new();
        let t0 = run.now();
        run.sleep(1_000_000_000).await;
        let t1 = run.now();
        assert!(t1 >= t0 + 1_000_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_resolves_after_all_tasks() {
        let run = Runtime::new();
        let group = TaskGroup::new();
        let run2 = run.clone();
        group.go("short", async move {
            run2.sleep(100_000_000).await;
        });
        let run3 = run.clone();
        group.go("long", async move {
            run3.sleep(500_000_000).await;
        });

        group.waiter().wait().await;
        assert!(run.now() >= 500_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_group_waiter_resolves_immediately() {
        let group = TaskGroup::new();
        group.waiter().wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn conjunction_joins_every_group() {
        let run = Runtime::new();
        let g1 = TaskGroup::new();
        let g2 = TaskGroup::new();
        let r1 = run.clone();
        g1.go("a", async move { r1.sleep(200_000_000).await });
        let r2 = run.clone();
        g2.go("b", async move { r2.sleep(300_000_000).await });

        join_all([g1.waiter(), g2.waiter()]).await;
        assert!(run.now() >= 300_000_000);
    }
}
