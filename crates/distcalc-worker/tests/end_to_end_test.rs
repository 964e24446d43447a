//! End-to-End Tests
//!
//! A real orchestrator and a real worker pool talking over HTTP, with the
//! operator costs set to zero so reductions finish quickly.

use distcalc_client::CalcClient;
use distcalc_common::protocol::{TaskStatus, TaskView};
use distcalc_orchestrator::{HttpServer, LeaseConfig, Orchestrator};
use distcalc_worker::{CostModel, RetryConfig, Worker, WorkerConfig, WorkerHandle};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Harness
// ============================================================================

struct Cluster {
    client: CalcClient,
    workers: WorkerHandle,
}

impl Cluster {
    async fn start(computing_power: usize) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let orchestrator = Arc::new(Orchestrator::with_config(LeaseConfig {
            enabled: false,
            ..Default::default()
        }));
        let server = HttpServer::new(orchestrator);
        tokio::spawn(async move {
            server.run_with_listener(listener).await.unwrap();
        });

        let config = WorkerConfig {
            computing_power,
            poll_interval: Duration::from_millis(10),
            costs: CostModel::zero(),
            retry: RetryConfig::default(),
        };
        let workers = Worker::new(CalcClient::new(url.clone()).unwrap(), config).spawn();

        Self {
            client: CalcClient::new(url).unwrap(),
            workers,
        }
    }

    async fn wait_terminal(&self, id: i64) -> TaskView {
        for _ in 0..500 {
            let view = self.client.task(id).await.unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not reach a terminal state", id);
    }
}

// ============================================================================
// Reductions
// ============================================================================

#[tokio::test]
async fn test_precedence_is_respected() {
    let cluster = Cluster::start(2).await;
    cluster.client.submit(1, "2+2*2").await.unwrap();

    let view = cluster.wait_terminal(1).await;
    assert_eq!(view.status, TaskStatus::Finished);
    assert_eq!(view.result, Some(6.0));
    assert_eq!(view.expression, "6");

    cluster.workers.shutdown().await;
}

#[tokio::test]
async fn test_division_by_zero_fails_task() {
    let cluster = Cluster::start(1).await;
    cluster.client.submit(1, "5/0").await.unwrap();

    let view = cluster.wait_terminal(1).await;
    assert_eq!(view.status, TaskStatus::Error);
    assert_eq!(view.result, None);

    cluster.workers.shutdown().await;
}

#[tokio::test]
async fn test_many_tasks_in_parallel() {
    let cluster = Cluster::start(4).await;
    let cases: [(i64, &str, f64); 5] = [
        (1, "(1+2)*(3+4)", 21.0),
        (2, "-3*-2", 6.0),
        (3, "10/4", 2.5),
        (4, "1+2+3+4+5", 15.0),
        (5, "(8-2)/(1+2)-1.5", 0.5),
    ];

    for (id, expression, _) in &cases {
        cluster.client.submit(*id, *expression).await.unwrap();
    }

    for (id, expression, expected) in &cases {
        let view = cluster.wait_terminal(*id).await;
        assert_eq!(view.status, TaskStatus::Finished, "{}", expression);
        assert_eq!(view.result, Some(*expected), "{}", expression);
    }

    let tasks = cluster.client.tasks().await.unwrap();
    assert_eq!(tasks.len(), cases.len());
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Finished));

    cluster.workers.shutdown().await;
}

#[tokio::test]
async fn test_error_in_one_branch_only_fails_its_task() {
    let cluster = Cluster::start(2).await;
    cluster.client.submit(1, "(1/0)+(2*3)").await.unwrap();
    cluster.client.submit(2, "2*3").await.unwrap();

    assert_eq!(cluster.wait_terminal(1).await.status, TaskStatus::Error);
    let healthy = cluster.wait_terminal(2).await;
    assert_eq!(healthy.result, Some(6.0));

    cluster.workers.shutdown().await;
}
