use crate::error::{Error, Result};
use crate::hw::traits::EventWaiter;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct HandoffState {
    closed: bool,
    request_seq: u64,
    done_seq: u64,
    failure: Option<Error>,
}

/// One unit's side of the worker handshake: the worker raises a request and
/// sleeps until the consumer acknowledges it or closes the unit.
#[derive(Debug, Default)]
struct Handoff {
    state: Mutex<HandoffState>,
    cvar: Condvar,
}

impl Handoff {
    fn lock(&self) -> MutexGuard<'_, HandoffState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct UnitWorker {
    unit: String,
    handoff: Arc<Handoff>,
    handle: Option<JoinHandle<()>>,
}

impl UnitWorker {
    pub fn spawn(unit: &str, waiter: Box<dyn EventWaiter>, waker: Arc<Notify>) -> Result<Self> {
        let handoff = Arc::new(Handoff::default());
        let thread_handoff = handoff.clone();
        let label = unit.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("mixer-{unit}"))
            .spawn(move || Self::work(&label, waiter, &thread_handoff, &waker))
            .map_err(|e| Error::io(unit, e))?;
        Ok(Self {
            unit: unit.to_string(),
            handoff,
            handle: Some(handle),
        })
    }

    fn work(unit: &str, mut waiter: Box<dyn EventWaiter>, handoff: &Handoff, waker: &Notify) {
        loop {
            if let Err(e) = waiter.wait() {
                let mut st = handoff.lock();
                if !st.closed {
                    warn!("{} event wait failed: {}", unit, e);
                    st.failure = Some(e);
                    waker.notify_one();
                }
                return;
            }
            let target = {
                let mut st = handoff.lock();
                if st.closed {
                    return;
                }
                st.request_seq = st.request_seq.saturating_add(1);
                st.request_seq
            };
            waker.notify_one();
            let mut st = handoff.lock();
            while st.done_seq < target && !st.closed {
                st = handoff
                    .cvar
                    .wait(st)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if st.closed {
                debug!("{} worker closed", unit);
                return;
            }
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Sequence number of an unacknowledged request, if the worker is waiting.
    pub fn pending(&self) -> Option<u64> {
        let st = self.handoff.lock();
        (st.request_seq > st.done_seq && !st.closed).then_some(st.request_seq)
    }

    pub fn acknowledge(&self, seq: u64) {
        let mut st = self.handoff.lock();
        st.done_seq = st.done_seq.max(seq);
        self.handoff.cvar.notify_all();
    }

    /// Set once the waiter reported that the unit's handle became invalid.
    pub fn failure(&self) -> Option<Error> {
        self.handoff.lock().failure.clone()
    }

    pub fn close(&self) {
        let mut st = self.handoff.lock();
        st.closed = true;
        self.handoff.cvar.notify_all();
    }

    /// Closes and joins. The unit must already be dropped so a blocked
    /// waiter wakes up.
    pub fn join(mut self) {
        self.close();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("{} worker panicked", self.unit);
        }
    }
}

impl Drop for UnitWorker {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Default)]
struct TimerState {
    stopped: bool,
    due: bool,
}

/// Low-frequency tick asking the consumer to re-enumerate units.
#[derive(Debug)]
pub struct HotplugTimer {
    state: Arc<(Mutex<TimerState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl HotplugTimer {
    pub fn spawn(interval: Duration, waker: Arc<Notify>) -> Result<Self> {
        let state = Arc::new((Mutex::new(TimerState::default()), Condvar::new()));
        let thread_state = state.clone();
        let handle = std::thread::Builder::new()
            .name("mixer-hotplug".to_string())
            .spawn(move || {
                let (lock, cvar) = &*thread_state;
                let mut st = lock.lock().unwrap_or_else(PoisonError::into_inner);
                loop {
                    let (guard, timeout) = cvar
                        .wait_timeout_while(st, interval, |s| !s.stopped)
                        .unwrap_or_else(PoisonError::into_inner);
                    st = guard;
                    if st.stopped {
                        return;
                    }
                    if timeout.timed_out() {
                        st.due = true;
                        waker.notify_one();
                    }
                }
            })
            .map_err(|e| Error::io("hotplug timer", e))?;
        Ok(Self {
            state,
            handle: Some(handle),
        })
    }

    pub fn take_due(&self) -> bool {
        let (lock, _) = &*self.state;
        let mut st = lock.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut st.due)
    }

    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.state;
            let mut st = lock.lock().unwrap_or_else(PoisonError::into_inner);
            st.stopped = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HotplugTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
