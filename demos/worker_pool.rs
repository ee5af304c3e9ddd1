//! Fans out a batch of jobs through a `TaskGroup` and reports any failures
//! as a single aggregated error.

use asyn_rt::{Runtime, TaskGroup, TaskHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let root = TaskHandle::root("worker-pool", Runtime::current());
    let group = TaskGroup::new(&root);

    for id in 0..5 {
        group.create_task(Some(format!("job-{id}")), async move {
            if id == 3 {
                return Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "job failed"));
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(())
        })?;
    }

    match group.exit().await {
        Ok(()) => println!("all jobs completed"),
        Err(aggregate) => println!("{} job(s) failed: {aggregate}", aggregate.len()),
    }

    Ok(())
}
