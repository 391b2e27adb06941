use std::collections::BTreeSet;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use infinity::error::{InfinityError, Result};
use infinity::mux::{Mux, Task};

fn deps(urns: &[&str]) -> BTreeSet<String> {
    urns.iter().map(|u| u.to_string()).collect()
}

fn task(work: impl FnOnce() -> Result<()> + Send + 'static) -> Task {
    Box::new(work)
}

fn settle(mux: &Mux) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while mux.pending() > 0 {
        assert!(Instant::now() < deadline, "mux never settled");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn a_task_counts_once_whatever_its_deps() {
    let mux = Mux::new(1).expect("mux starts");
    let warm_up = task(|| {
        thread::sleep(Duration::from_millis(20));
        Ok(())
    });
    mux.submit(deps(&["urn:test:warm"]), "warm-up", warm_up).unwrap();
    settle(&mux);

    let (release, gate) = mpsc::channel::<()>();
    let urns = ["urn:test:a", "urn:test:b", "urn:test:c"];
    let blocked = task(move || {
        gate.recv().ok();
        Ok(())
    });
    mux.submit(deps(&urns), "blocked", blocked).unwrap();
    assert_eq!(mux.pending(), 1);
    let stats = mux.statistics();
    assert_eq!(stats["waiting"], 1);
    assert_eq!(stats["dependencies"], 3);

    let mean = Duration::from_secs_f64(stats["mean_ms"].as_f64().unwrap() / 1000.0);
    let eta = mux.eta(&urns);
    assert!(eta >= Duration::from_millis(20), "{eta:?}");
    let drift = if eta > mean { eta - mean } else { mean - eta };
    assert!(drift < Duration::from_micros(10), "eta {eta:?} against mean {mean:?}");
    assert!(mux.eta(&["urn:test:other"]).is_zero());

    release.send(()).unwrap();
    settle(&mux);
    assert!(mux.eta(&urns).is_zero());
}

#[test]
fn failures_are_not_fatal() {
    let mux = Mux::new(2).unwrap();
    let fails = task(|| Err(InfinityError::IllegalState("no".into())));
    mux.submit(deps(&["urn:test:x"]), "fails", fails).unwrap();
    let panics = task(|| panic!("worker must survive"));
    mux.submit(deps(&["urn:test:x"]), "panics", panics).unwrap();
    settle(&mux);
    let (done, seen) = mpsc::channel();
    let works = task(move || {
        done.send(()).ok();
        Ok(())
    });
    mux.submit(deps(&["urn:test:x"]), "works", works).unwrap();
    seen.recv_timeout(Duration::from_secs(10)).expect("workers still run");
}

#[test]
fn closed_mux_refuses_work() {
    assert!(matches!(Mux::new(0), Err(InfinityError::Config(_))));
    let mux = Mux::new(1).unwrap();
    mux.close();
    let refused = mux.submit(deps(&["urn:test:x"]), "late", task(|| Ok(())));
    assert!(matches!(refused, Err(InfinityError::IllegalState(_))));
}
