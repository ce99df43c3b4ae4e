pub mod control;
pub mod sweeper;

use async_trait::async_trait;
use tracing::{error, info};

use crate::Error;

#[async_trait]
pub trait TaskHandler: Send + 'static {
    fn name(&self) -> &'static str;
    async fn run(&mut self) -> Result<(), Error>;
}

#[derive(Default)]
pub struct TaskManager {
    tasks: Vec<Box<dyn TaskHandler>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_task(&mut self, task: impl TaskHandler) {
        self.tasks.push(Box::new(task));
    }

    pub fn run_all(self) {
        for mut task in self.tasks {
            let task_name = task.name();

            tokio::spawn(async move {
                info!("Task {} started", task_name);
                match task.run().await {
                    Ok(()) => info!("Task {} finished", task_name),
                    Err(e) => error!("Task {} failed: {}", task_name, e),
                }
            });
        }
    }
}
