//! Host bridge - the request surface a single-threaded host calls into
//!
//! Every request validates its parameters, hands a task to the service
//! and returns at once. Outcomes come back through [`System2::tick`].

use crate::dispatcher::{CallbackHost, DispatchSummary, FrameDispatcher};
use crate::error::{Error, Result};
use crate::service::{TaskCommand, TaskService};
use crate::task::{self, Operation, Task};
use crate::types::{
    CallbackHandle, CommandOutput, FtpDirection, FtpEndpoint, FtpRequest, Settings, TaskId,
    TaskTarget, UserToken, MAX_COMMAND_LENGTH, MAX_CREDENTIAL_LENGTH, MAX_PATH_LENGTH,
    MAX_USER_AGENT_LENGTH,
};
use crate::utils::{check_optional_param, check_param};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Engine handle owned by the host thread
pub struct System2 {
    settings: Arc<Settings>,
    cmd_sender: async_channel::Sender<TaskCommand>,
    dispatcher: FrameDispatcher,
    service: Option<JoinHandle<()>>,
}

impl System2 {
    /// Start the task service with the given settings
    pub fn start(settings: Settings) -> Result<Self> {
        let settings = Arc::new(settings);
        let dispatcher = FrameDispatcher::new();
        let (cmd_sender, cmd_receiver) = async_channel::unbounded::<TaskCommand>();

        let service = TaskService::new(settings.clone(), dispatcher.sender())?;
        let handle = service.spawn(cmd_receiver)?;

        Ok(Self {
            settings,
            cmd_sender,
            dispatcher,
            service: Some(handle),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a command whose outcome nobody listens to
    pub fn run_command(&self, command: &str, token: UserToken) -> Result<TaskId> {
        self.submit_command(command, None, token)
    }

    /// Run a command and deliver its output to `callback`
    pub fn run_command_with_callback(
        &self,
        command: &str,
        callback: CallbackHandle,
        token: UserToken,
    ) -> Result<TaskId> {
        self.submit_command(command, Some(callback), token)
    }

    fn submit_command(
        &self,
        command: &str,
        callback: Option<CallbackHandle>,
        token: UserToken,
    ) -> Result<TaskId> {
        check_param("command", command, MAX_COMMAND_LENGTH)?;
        self.submit(
            TaskTarget::new(callback, token),
            Operation::Command {
                command: command.to_string(),
            },
        )
    }

    /// Download `url` over HTTP into `local_path`
    pub fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        callback: CallbackHandle,
        token: UserToken,
        progress: Option<CallbackHandle>,
    ) -> Result<TaskId> {
        check_param("url", url, MAX_PATH_LENGTH)?;
        check_path("local path", local_path)?;
        self.submit(
            TaskTarget::new(Some(callback), token).with_progress(progress),
            Operation::Download {
                url: url.to_string(),
                local_path: local_path.to_path_buf(),
            },
        )
    }

    /// Fetch `remote_path` from an FTP server into `local_path`
    pub fn download_ftp_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        endpoint: FtpEndpoint,
        callback: CallbackHandle,
        token: UserToken,
        progress: Option<CallbackHandle>,
    ) -> Result<TaskId> {
        self.submit_ftp(
            FtpDirection::Download,
            remote_path,
            local_path,
            endpoint,
            TaskTarget::new(Some(callback), token).with_progress(progress),
        )
    }

    /// Store `local_path` on an FTP server as `remote_path`
    pub fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        endpoint: FtpEndpoint,
        callback: CallbackHandle,
        token: UserToken,
        progress: Option<CallbackHandle>,
    ) -> Result<TaskId> {
        self.submit_ftp(
            FtpDirection::Upload,
            remote_path,
            local_path,
            endpoint,
            TaskTarget::new(Some(callback), token).with_progress(progress),
        )
    }

    fn submit_ftp(
        &self,
        direction: FtpDirection,
        remote_path: &str,
        local_path: &Path,
        endpoint: FtpEndpoint,
        target: TaskTarget,
    ) -> Result<TaskId> {
        check_param("remote path", remote_path, MAX_PATH_LENGTH)?;
        check_path("local path", local_path)?;
        check_param("host", &endpoint.host, MAX_PATH_LENGTH)?;
        check_optional_param("username", &endpoint.username, MAX_CREDENTIAL_LENGTH)?;
        check_optional_param("password", &endpoint.password, MAX_CREDENTIAL_LENGTH)?;
        if endpoint.port == 0 {
            return Err(Error::InvalidInput("port must not be 0".to_string()));
        }

        self.submit(
            target,
            Operation::Ftp(FtpRequest {
                direction,
                host: endpoint.host,
                port: endpoint.port,
                username: endpoint.username,
                password: endpoint.password,
                remote_path: remote_path.to_string(),
                local_path: local_path.to_path_buf(),
            }),
        )
    }

    /// Copy a local file, creating missing directories of `destination`
    pub fn copy_file(
        &self,
        source: &Path,
        destination: &Path,
        callback: CallbackHandle,
        token: UserToken,
    ) -> Result<TaskId> {
        check_path("source", source)?;
        check_path("destination", destination)?;
        self.submit(
            TaskTarget::new(Some(callback), token),
            Operation::Copy {
                source: source.to_path_buf(),
                destination: destination.to_path_buf(),
            },
        )
    }

    /// Fetch a page into memory; a non-empty `post_body` turns it into a POST
    pub fn get_page(
        &self,
        url: &str,
        post_body: &str,
        user_agent: &str,
        callback: CallbackHandle,
        token: UserToken,
    ) -> Result<TaskId> {
        check_param("url", url, MAX_PATH_LENGTH)?;
        check_optional_param("post body", post_body, MAX_PATH_LENGTH)?;
        check_optional_param("user agent", user_agent, MAX_USER_AGENT_LENGTH)?;
        self.submit(
            TaskTarget::new(Some(callback), token),
            Operation::Page {
                url: url.to_string(),
                post_body: post_body.to_string(),
                user_agent: user_agent.to_string(),
            },
        )
    }

    /// Run a command on the host thread and wait for it
    pub fn run_command_blocking(&self, command: &str) -> Result<CommandOutput> {
        check_param("command", command, MAX_COMMAND_LENGTH)?;
        task::run_blocking(command, &self.settings)
    }

    /// Deliver every record queued since the previous tick
    pub fn tick<H: CallbackHost + ?Sized>(&self, host: &mut H) -> DispatchSummary {
        self.dispatcher.dispatch(host)
    }

    /// Records waiting for the next tick
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Stop the service and wait for running tasks to finish.
    ///
    /// Their records stay queued; call [`System2::tick`] once more to
    /// deliver them.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.service.take() else {
            return;
        };
        if let Err(e) = self.cmd_sender.send_blocking(TaskCommand::Shutdown) {
            log::debug!("Task service already gone: {}", e);
        }
        if handle.join().is_err() {
            log::error!("Task service thread panicked");
        }
    }

    fn submit(&self, target: TaskTarget, operation: Operation) -> Result<TaskId> {
        if self.service.is_none() {
            return Err(Error::Channel("task service is shut down".to_string()));
        }
        let task = Task::new(target, operation);
        log::debug!("Queued {} task {}", task.kind(), target.id);
        self.cmd_sender.try_send(TaskCommand::Spawn(task)).map_err(|e| {
            Error::Channel(format!("task service unavailable: {}", e))
        })?;
        Ok(target.id)
    }
}

fn check_path(field: &str, path: &Path) -> Result<()> {
    check_param(field, &path.to_string_lossy(), MAX_PATH_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::CallbackRegistry;

    #[test]
    fn test_invalid_parameters_are_rejected_synchronously() {
        let mut system = System2::start(Settings::default()).unwrap();
        let callback = CallbackHandle(1);

        assert!(matches!(
            system.run_command("", UserToken(0)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            system.run_command(&"x".repeat(MAX_COMMAND_LENGTH + 1), UserToken(0)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            system.get_page("", "", "", callback, UserToken(0)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            system.get_page(
                "http://x",
                "",
                &"a".repeat(MAX_USER_AGENT_LENGTH + 1),
                callback,
                UserToken(0)
            ),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            system.upload_file(
                Path::new("/tmp/a"),
                "/a",
                FtpEndpoint::new("host", 0, "u", "p"),
                callback,
                UserToken(0),
                None
            ),
            Err(Error::InvalidInput(_))
        ));

        system.shutdown();
        assert_eq!(system.pending(), 0);
    }

    #[test]
    fn test_whitespace_credentials_and_body_are_accepted() {
        let settings = Settings {
            connect_timeout_secs: 2,
            ..Default::default()
        };
        let mut system = System2::start(settings).unwrap();
        let callback = CallbackHandle(1);

        assert!(system
            .upload_file(
                Path::new("/nonexistent/a"),
                "/a",
                FtpEndpoint::new("127.0.0.1", 1, "   ", "   "),
                callback,
                UserToken(0),
                None
            )
            .is_ok());
        assert!(system
            .get_page("http://127.0.0.1:1/", " ", " ", callback, UserToken(0))
            .is_ok());
        assert!(matches!(
            system.get_page(
                "http://x",
                &" ".repeat(MAX_PATH_LENGTH + 1),
                "",
                callback,
                UserToken(0)
            ),
            Err(Error::InvalidInput(_))
        ));

        system.shutdown();
        assert_eq!(system.pending(), 2);
    }

    #[test]
    fn test_requests_after_shutdown_fail() {
        let mut system = System2::start(Settings::default()).unwrap();
        system.shutdown();
        let mut registry = CallbackRegistry::new();
        let callback = registry.register(|_| Ok(()));

        assert!(matches!(
            system.copy_file(Path::new("/a"), Path::new("/b"), callback, UserToken(1)),
            Err(Error::Channel(_))
        ));
        assert_eq!(system.tick(&mut registry), DispatchSummary::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_blocking() {
        let mut system = System2::start(Settings::default()).unwrap();
        let output = system.run_command_blocking("echo hi").unwrap();
        assert_eq!(output.output, "hi\n");
        assert_eq!(output.status, 0);
        system.shutdown();
    }
}
