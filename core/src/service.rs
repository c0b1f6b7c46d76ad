// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Given to a background task so it can notice that its owner asked it to stop.
pub struct StopHandle {
    shutdown_rx: oneshot::Receiver<()>,
}

impl StopHandle {
    fn new(shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self { shutdown_rx }
    }

    /// Resolves once a stop was requested or the owning handle was dropped.
    ///
    /// Meant to be polled from a `select!` arm next to the task's real work:
    ///
    /// ```rust
    /// use glasses_hud_core::spawn_service;
    ///
    /// async fn run() {
    ///     let handle = spawn_service(|mut stop| async move {
    ///         stop.signaled().await;
    ///     });
    ///     handle.shutdown().await.unwrap();
    /// }
    /// ```
    pub async fn signaled(&mut self) {
        (&mut self.shutdown_rx).await.unwrap_or_default();
    }
}

/// Owner side of a spawned background task.
pub struct ServiceHandle {
    join: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    pub fn new(join: JoinHandle<()>, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self { join, shutdown_tx: Some(shutdown_tx) }
    }

    /// Signals the task without waiting for it.
    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub async fn await_join(self) -> Result<(), tokio::task::JoinError> {
        self.join.await
    }

    /// Signals the task and waits until it has finished.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.request_shutdown();
        self.await_join().await
    }

    /// Stops the task without awaiting it. Safe to call from inside the task itself
    /// or from synchronous teardown paths.
    pub fn stop_now(mut self) {
        self.request_shutdown();
        self.join.abort();
    }

    pub fn abort(self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns `f` on the tokio runtime, handing it a [`StopHandle`].
pub fn spawn_service<Fut, Func>(f: Func) -> ServiceHandle
where
    Fut: Future<Output = ()> + Send + 'static,
    Func: FnOnce(StopHandle) -> Fut + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let stop = StopHandle::new(shutdown_rx);
    let join = tokio::spawn(async move {
        f(stop).await;
    });
    ServiceHandle::new(join, shutdown_tx)
}

/// Several background tasks stopped together.
#[derive(Default)]
pub struct MultiServiceHandle {
    handles: Vec<ServiceHandle>,
}

impl MultiServiceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { handles: Vec::with_capacity(cap) }
    }

    pub fn add(&mut self, handle: ServiceHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every task first, then joins them in insertion order.
    /// Returns the first join error, if any.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        for h in &mut self.handles {
            h.request_shutdown();
        }
        let mut first_err: Option<tokio::task::JoinError> = None;
        for h in self.handles.into_iter() {
            if let Err(e) = h.await_join().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn shutdown_wakes_the_stop_handle() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let flag = stopped.clone();
        let handle = spawn_service(move |mut stop| async move {
            stop.signaled().await;
            flag.fetch_add(1, Ordering::SeqCst);
        });
        handle.shutdown().await.unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multi_handle_stops_every_task() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let mut multi = MultiServiceHandle::with_capacity(3);
        for _ in 0..3 {
            let flag = stopped.clone();
            multi.add(spawn_service(move |mut stop| async move {
                stop.signaled().await;
                flag.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(multi.len(), 3);
        multi.shutdown().await.unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stop_now_does_not_wait_for_the_task() {
        let handle = spawn_service(|_stop| async move {
            loop {
                sleep(Duration::from_millis(5)).await;
            }
        });
        handle.stop_now();
    }
}
