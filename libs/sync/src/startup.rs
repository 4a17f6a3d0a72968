use std::sync::{Arc, Condvar, Mutex};

use anyhow::anyhow;

/// One-shot handshake that lets a constructor block until its consumer thread is running.
#[derive(Clone, Default)]
pub(crate) struct StartupLatch(Arc<(Mutex<bool>, Condvar)>);

impl StartupLatch {
    /// Called from the consumer thread as its first action.
    pub(crate) fn notify_started(&self) -> anyhow::Result<()> {
        let (lock, cvar) = &*self.0;
        let mut started = lock
            .lock()
            .map_err(|_| anyhow!("Unexpected lock poisoning on startup of queue consumer!"))?;
        *started = true;
        cvar.notify_all();
        Ok(())
    }

    /// Blocks until [`StartupLatch::notify_started`] has been called.
    pub(crate) fn wait(&self) -> anyhow::Result<()> {
        let (lock, cvar) = &*self.0;
        let started = lock
            .lock()
            .map_err(|_| anyhow!("Unexpected lock poisoning while waiting for queue consumer!"))?;
        let _started = cvar
            .wait_while(started, |started| !*started)
            .map_err(|_| anyhow!("Unexpected lock poisoning while waiting for queue consumer!"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::StartupLatch;

    #[test]
    fn wait_returns_after_notify() {
        let latch = StartupLatch::default();
        let notifier = latch.clone();

        let handle = std::thread::spawn(move || notifier.notify_started());
        latch.wait().unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn wait_after_notify_does_not_block() {
        let latch = StartupLatch::default();
        latch.notify_started().unwrap();
        latch.wait().unwrap();
    }
}
