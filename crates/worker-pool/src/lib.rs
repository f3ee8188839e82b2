//! Fixed-size, reusable worker pool with a single-submission broadcast
//! barrier.
//!
//! `n` threads are spawned once by [`WorkerPool::new`] and block on a
//! condition variable until work arrives. A call to [`WorkerPool::submit`]
//! installs up to `n` job closures (closure `i` pinned to worker `i`, no
//! stealing), wakes exactly that many workers, and returns immediately;
//! [`WorkerPool::wait`] blocks until every woken worker has finished and
//! re-idles the pool. Only one submission may be in flight between a
//! `submit`/`wait` pair — this mirrors the extractor's usage (partition,
//! submit, wait, use the result) and keeps the pool's internal state
//! (a fixed `Vec` of per-worker job slots) simple.
//!
//! `submit` is `unsafe`: to let workers write into a caller's pre-allocated
//! output buffer without forcing every job to be `'static` (the whole
//! point of the extractor's usage), job closures are allowed to borrow
//! data with a shorter lifetime than the pool itself. The borrow is sound
//! only because `wait()` is a full barrier — the calling thread observes
//! every worker's writes before it can touch the borrowed data again, and
//! no job closure survives past the matching `wait()`. The safety
//! obligation on the caller is exactly that: always pair `submit` with a
//! `wait()` before the borrowed data is dropped or mutated again.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

struct State {
    jobs: Vec<Option<Job>>,
    active_count: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    work_available: Condvar,
    work_done: Condvar,
}

fn worker_loop(index: usize, shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.shutdown {
                    return;
                }
                if state.jobs[index].is_some() {
                    break;
                }
                state = shared.work_available.wait(state).unwrap();
            }
            state.jobs[index].take()
        };

        if let Some(job) = job {
            job();
            let mut state = shared.state.lock().unwrap();
            state.active_count -= 1;
            if state.active_count == 0 {
                shared.work_done.notify_all();
            }
        }
    }
}

/// A fixed-size pool of reusable OS threads with a one-shot-broadcast,
/// no-stealing scheduling model.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<thread::JoinHandle<()>>,
    size: usize,
    in_flight: bool,
}

impl WorkerPool {
    /// Spawn `n` worker threads. They block immediately, awaiting work.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "worker pool size must be at least 1");
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                jobs: (0..n).map(|_| None).collect(),
                active_count: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            work_done: Condvar::new(),
        });
        let handles = (0..n)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("vdyn-worker-{i}"))
                    .spawn(move || worker_loop(i, shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self {
            shared,
            handles,
            size: n,
            in_flight: false,
        }
    }

    /// Number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Install up to `size()` jobs (excess jobs beyond `size()` are never
    /// run — callers partition their own work into at most `size()`
    /// pieces), wake that many workers, and return without waiting.
    ///
    /// # Safety
    /// Every job closure must not be touched (its captures read or
    /// written by any other thread) after this call returns until
    /// [`WorkerPool::wait`] on the same pool returns. Typical usage
    /// submits and waits within the same function, which upholds this
    /// trivially.
    pub unsafe fn submit<'scope, F>(&mut self, jobs: Vec<F>)
    where
        F: FnOnce() + Send + 'scope,
    {
        assert!(!self.in_flight, "only one submission may be in flight");
        let n_items = jobs.len().min(self.size);

        let mut state = self.shared.state.lock().unwrap();
        for (i, job) in jobs.into_iter().enumerate().take(n_items) {
            let boxed: Box<dyn FnOnce() + Send + 'scope> = Box::new(job);
            let boxed: Job = std::mem::transmute::<
                Box<dyn FnOnce() + Send + 'scope>,
                Box<dyn FnOnce() + Send + 'static>,
            >(boxed);
            state.jobs[i] = Some(boxed);
        }
        state.active_count = n_items;
        self.in_flight = true;
        drop(state);
        self.shared.work_available.notify_all();
    }

    /// Block until every worker woken by the last `submit` has finished.
    /// Establishes a happens-before edge from every worker's writes during
    /// that submission to whatever the calling thread does next.
    pub fn wait(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        while state.active_count > 0 {
            state = self.shared.work_done.wait(state).unwrap();
        }
        self.in_flight = false;
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.in_flight {
            tracing::warn!("WorkerPool dropped with a submission in flight; call wait() first");
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.work_available.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
