use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use taskmodel::prelude::*;
use taskmodel::utils::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> TaskModelResult<()> {
    let config = SchedulerConfig::development()
        .with_max_remaining_time(60_000)
        .with_sweep_interval(30_000)
        .with_monitor_method(Method::Get);
    init_tracing(&config.logging)?;

    let scheduler = TaskScheduler::new(config)?;
    let mut operations = OperationRegistry::new();
    scheduler.init(&mut operations).await?;

    // fixed delay, no estimate
    let some_job = scheduler
        .wrap(LongRunning::auto(|args, done| async move {
            let delay = args.first().and_then(Value::as_u64).unwrap_or(1000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let _ = done.complete(vec![json!(format!("slept {} ms", delay))]).await;
        }))
        .with_params(["delay"]);
    operations.insert("/someJob", Arc::new(some_job));

    // one second per step, reported as it goes
    let some_job2 = scheduler
        .wrap(LongRunning::appraised(
            |args, done| async move {
                let steps = args.first().and_then(Value::as_u64).unwrap_or(1);
                for _ in 0..steps {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    let _ = done.progress(1000).await;
                }
                let _ = done.complete(vec![json!(steps)]).await;
            },
            |args| args.first().and_then(Value::as_u64).map(|steps| steps * 1000),
        ))
        .with_params(["steps"]);
    operations.insert("/someJob2", Arc::new(some_job2));

    println!("Operations: {:?}", operations.paths());

    let declined = operations.invoke("/someJob2", vec![json!(120)]).await;
    println!("/someJob2 x120 -> {} {:?}", declined.status.code(), declined.body);

    for (path, args) in [("/someJob", json!(1500)), ("/someJob2", json!(3))] {
        let accepted = operations.invoke(path, vec![args]).await;
        println!("{} -> {} {:?}", path, accepted.status.code(), accepted.body);

        let ResponseBody::Accepted { task_id, .. } = accepted.body else {
            continue;
        };

        loop {
            let polled = operations
                .invoke("/tasks/{taskId}", vec![json!(task_id)])
                .await;
            println!("  poll {} -> {} {:?}", task_id, polled.status.code(), polled.body);

            if polled.status != Status::NoContent && polled.status != Status::Created {
                break;
            }
            let wait = polled
                .header("Retry-After")
                .and_then(|secs| secs.parse::<u64>().ok())
                .unwrap_or(1)
                .max(1);
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    println!("Stats: {:?}", scheduler.stats().await?);
    println!("Collector running, press Ctrl+C to stop...");

    if let Err(e) = signal::ctrl_c().await {
        eprintln!("Failed to listen for ctrl+c: {}", e);
    }

    scheduler.shutdown().await?;
    println!("Scheduler stopped");
    Ok(())
}
