//! Spawns a root task, a child under it, and waits for the child to finish.

use asyn_rt::{Priority, Runtime, TaskHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let root = TaskHandle::root("app", Runtime::current());
    let worker = root.new_child("fetch-config", Priority::Normal)?;

    let result: Result<&str, std::io::Error> = worker
        .run(async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok("config loaded")
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));

    println!("{}", result?);
    println!("root tree: {:?}", root.get_task_tree());
    Ok(())
}
