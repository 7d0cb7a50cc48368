//! Forked child processes backing process-mode workers
//!
//! Each pool worker owns one child. The worker writes a [`Request`] line to
//! the child's stdin-like pipe and blocks on the answer line; the child runs
//! the named handler from the registry it inherited through `fork`.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(unix)] {
        use std::fs::File;
        use std::io::{BufReader, BufWriter};
        use std::os::fd::{AsRawFd, OwnedFd, RawFd};
        use std::panic::{catch_unwind, AssertUnwindSafe};

        use nix::sys::signal::{kill, Signal};
        use nix::sys::wait::waitpid;
        use nix::unistd::{fork, pipe, ForkResult, Pid};
        use serde_json::Value;
        use tasklet_core::{Error, Result, TaskError};

        use super::codec::{read_frame, write_frame, Request, Response};
        use super::registry::TaskRegistry;
        use crate::executor::Initializer;

        /// Exit status of a child whose initializer or loop panicked
        const EXIT_PANIC: i32 = 70;

        /// Parent-side handle to one child process
        pub(crate) struct ChildWorker {
            pid: Pid,
            requests: Option<BufWriter<File>>,
            responses: BufReader<File>,
            next_id: u64,
            reaped: bool,
        }

        impl ChildWorker {
            /// Fork a child serving `registry`
            ///
            /// The child runs `initializer` with `worker_id` before reading
            /// its first request.
            pub(crate) fn spawn(
                worker_id: usize,
                registry: &TaskRegistry,
                initializer: Option<&Initializer>,
            ) -> Result<Self> {
                let (req_read, req_write) = pipe().map_err(|e| os_error("pipe", e))?;
                let (resp_read, resp_write) = pipe().map_err(|e| os_error("pipe", e))?;

                // Safety: the child never returns into the caller; it serves
                // requests and leaves through `_exit`
                match unsafe { fork() }.map_err(|e| os_error("fork", e))? {
                    ForkResult::Parent { child } => {
                        drop(req_read);
                        drop(resp_write);
                        Ok(Self {
                            pid: child,
                            requests: Some(BufWriter::new(File::from(req_write))),
                            responses: BufReader::new(File::from(resp_read)),
                            next_id: 1,
                            reaped: false,
                        })
                    }
                    ForkResult::Child => {
                        drop(req_write);
                        drop(resp_read);
                        close_inherited_fds(&[req_read.as_raw_fd(), resp_write.as_raw_fd()]);
                        let served = catch_unwind(AssertUnwindSafe(|| {
                            child_main(worker_id, registry, initializer, req_read, resp_write)
                        }));
                        let code = if served.is_ok() { 0 } else { EXIT_PANIC };
                        // Safety: skips destructors of state owned by the parent
                        unsafe { libc::_exit(code) }
                    }
                }
            }

            pub(crate) fn pid(&self) -> Pid {
                self.pid
            }

            /// Run `task` in the child
            ///
            /// The outer error means the child is gone or the pipe is
            /// corrupt; the inner one is the task's own failure.
            pub(crate) fn call(
                &mut self,
                task: &str,
                args: Value,
            ) -> Result<core::result::Result<Value, TaskError>> {
                let id = self.next_id;
                self.next_id += 1;
                let requests = self
                    .requests
                    .as_mut()
                    .ok_or_else(|| Error::Worker(format!("worker process {} stopped", self.pid)))?;
                write_frame(
                    requests,
                    &Request::Call {
                        id,
                        task: task.to_string(),
                        args,
                    },
                )?;
                let response: Response = read_frame(&mut self.responses)?
                    .ok_or_else(|| Error::Worker(format!("worker process {} exited", self.pid)))?;
                if response.id() != id {
                    return Err(Error::Codec(format!(
                        "response id {} does not match request {}",
                        response.id(),
                        id
                    )));
                }
                Ok(response.into_result())
            }

            /// SIGKILL the child and reap it
            pub(crate) fn kill(mut self) {
                self.requests = None;
                let _ = kill(self.pid, Signal::SIGKILL);
                let _ = waitpid(self.pid, None);
                self.reaped = true;
            }
        }

        impl Drop for ChildWorker {
            fn drop(&mut self) {
                if self.reaped {
                    return;
                }
                if let Some(mut requests) = self.requests.take() {
                    let _ = write_frame(&mut requests, &Request::Shutdown);
                }
                let _ = waitpid(self.pid, None);
            }
        }

        fn child_main(
            worker_id: usize,
            registry: &TaskRegistry,
            initializer: Option<&Initializer>,
            requests: OwnedFd,
            responses: OwnedFd,
        ) {
            if let Some(init) = initializer {
                init(worker_id);
            }
            let mut requests = BufReader::new(File::from(requests));
            let mut responses = BufWriter::new(File::from(responses));
            loop {
                match read_frame::<_, Request>(&mut requests) {
                    Ok(Some(Request::Call { id, task, args })) => {
                        let response = Response::from_result(id, registry.call(&task, args));
                        if write_frame(&mut responses, &response).is_err() {
                            return;
                        }
                    }
                    Ok(Some(Request::Shutdown)) | Ok(None) | Err(_) => return,
                }
            }
        }

        /// Close every descriptor above stderr except `keep`
        ///
        /// Pipes to sibling children must not stay open here, or those
        /// siblings never see end-of-file.
        fn close_inherited_fds(keep: &[RawFd]) {
            // Safety: sysconf has no preconditions
            let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
            let limit = if limit > 0 { limit.min(65_536) as RawFd } else { 1024 };
            for fd in 3..limit {
                if !keep.contains(&fd) {
                    // Safety: nothing in the child uses these descriptors
                    unsafe { libc::close(fd) };
                }
            }
        }

        fn os_error(what: &str, err: nix::errno::Errno) -> Error {
            Error::Worker(format!("{what}: {err}"))
        }
    } else {
        use serde_json::Value;
        use tasklet_core::{Error, Result, TaskError};

        use super::registry::TaskRegistry;
        use crate::executor::Initializer;

        pub(crate) struct ChildWorker;

        impl ChildWorker {
            pub(crate) fn spawn(
                _worker_id: usize,
                _registry: &TaskRegistry,
                _initializer: Option<&Initializer>,
            ) -> Result<Self> {
                Err(Error::Config("process workers require a unix platform".to_string()))
            }

            pub(crate) fn pid(&self) -> u32 {
                0
            }

            pub(crate) fn call(
                &mut self,
                _task: &str,
                _args: Value,
            ) -> Result<core::result::Result<Value, TaskError>> {
                Err(Error::Worker("process workers require a unix platform".to_string()))
            }

            pub(crate) fn kill(self) {}
        }
    }
}
