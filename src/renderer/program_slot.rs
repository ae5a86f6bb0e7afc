//! Hand-over point for hot-reloaded programs
//!
//! Frames always draw with `current()`. A reload only replaces it once the
//! new program has finished compiling successfully within the timeout, so no
//! frame ever observes a half-built or broken program.

use std::future::Future;
use std::time::Duration;

use futures::future::{select, Either};
use futures_timer::Delay;

use crate::error::{EngineError, EngineResult};

use super::error::{shader_load_error, shader_reload_error};

pub struct ProgramSlot<P> {
    name: String,
    current: P,
    generation: u64,
}

impl<P> ProgramSlot<P> {
    /// Wait for the startup program. Failure here is fatal for the caller.
    pub async fn load_initial<F, E>(name: impl Into<String>, load: F) -> EngineResult<Self>
    where
        F: Future<Output = Result<P, E>>,
        E: std::fmt::Display,
    {
        let name = name.into();
        match load.await {
            Ok(program) => {
                log::info!("[ProgramSlot] Loaded '{}'", name);
                Ok(Self {
                    name,
                    current: program,
                    generation: 0,
                })
            }
            Err(e) => {
                log::error!("[ProgramSlot] Failed to load '{}': {}", name, e);
                Err(shader_load_error(&name, e))
            }
        }
    }

    /// Slot around an already compiled program
    pub fn with_program(name: impl Into<String>, program: P) -> Self {
        Self {
            name: name.into(),
            current: program,
            generation: 0,
        }
    }

    /// Swap in the result of `reload` if it succeeds within `timeout`.
    /// On failure or timeout the previous program stays current.
    pub async fn reload<F, E>(&mut self, reload: F, timeout: Duration) -> EngineResult<u64>
    where
        F: Future<Output = Result<P, E>>,
        E: std::fmt::Display,
    {
        let reload = Box::pin(reload);

        match select(reload, Delay::new(timeout)).await {
            Either::Left((Ok(program), _)) => {
                self.current = program;
                self.generation += 1;
                log::info!(
                    "[ProgramSlot] Reloaded '{}' (generation {})",
                    self.name,
                    self.generation
                );
                Ok(self.generation)
            }
            Either::Left((Err(e), _)) => {
                log::error!(
                    "[ProgramSlot] Reload of '{}' failed, keeping previous program: {}",
                    self.name,
                    e
                );
                Err(shader_reload_error(&self.name, e))
            }
            Either::Right(_) => {
                log::error!(
                    "[ProgramSlot] Reload of '{}' timed out after {:?}, keeping previous program",
                    self.name,
                    timeout
                );
                Err(EngineError::Timeout {
                    operation: format!("reload of '{}'", self.name),
                    timeout,
                })
            }
        }
    }

    pub fn current(&self) -> &P {
        &self.current
    }

    /// Bumped on every successful reload
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn slot() -> ProgramSlot<&'static str> {
        pollster::block_on(ProgramSlot::load_initial("forward", async {
            Ok::<_, String>("v1")
        }))
        .unwrap()
    }

    #[test]
    fn test_initial_failure_is_an_error() {
        let result = pollster::block_on(ProgramSlot::<u32>::load_initial("broken", async {
            Err::<u32, _>("syntax error at line 3")
        }));
        assert!(matches!(result, Err(EngineError::ShaderLoadFailed { .. })));
    }

    #[test]
    fn test_successful_reload_swaps_program() {
        let mut slot = slot();
        let generation =
            pollster::block_on(slot.reload(async { Ok::<_, String>("v2") }, TIMEOUT)).unwrap();

        assert_eq!(generation, 1);
        assert_eq!(*slot.current(), "v2");
    }

    #[test]
    fn test_failed_reload_keeps_previous_program() {
        let mut slot = slot();
        let result = pollster::block_on(slot.reload(
            async { Err::<&'static str, _>("link error") },
            TIMEOUT,
        ));

        assert!(matches!(result, Err(EngineError::ShaderReloadFailed { .. })));
        assert_eq!(*slot.current(), "v1");
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn test_timed_out_reload_keeps_previous_program() {
        let mut slot = slot();
        // Sender kept alive so the compile never finishes
        let (_sender, receiver) = oneshot::channel::<&'static str>();
        let stalled = async move { receiver.await.map_err(|e| e.to_string()) };

        let result = pollster::block_on(slot.reload(stalled, TIMEOUT));

        assert!(matches!(result, Err(EngineError::Timeout { .. })));
        assert_eq!(*slot.current(), "v1");
    }

    #[test]
    fn test_reload_finishing_in_time_from_other_thread() {
        let mut slot = slot();
        let (sender, receiver) = oneshot::channel::<&'static str>();
        let compiler = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            sender.send("v3").ok();
        });

        let compiled = async move { receiver.await.map_err(|e| e.to_string()) };
        let result = pollster::block_on(slot.reload(compiled, Duration::from_secs(5)));
        compiler.join().unwrap();

        assert_eq!(result.unwrap(), 1);
        assert_eq!(*slot.current(), "v3");
    }
}
