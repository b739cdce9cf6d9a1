//! Headless counter demo: mounts a small component tree into the in-memory
//! host, drives the cooperative loop in time slices, and fires click events
//! the way a host event loop would.
//!
//! Run with `RUST_LOG=info` to watch the scheduler at work.

use std::time::Duration;

use log::{debug, info};
use weft_core::{
    component_fn, use_effect, use_state, ComponentFn, Element, HostNodeId, MemoryHost, Props,
    RenderError, Runtime, WorkStatus,
};
use weft_core::deps;
use weft_runtime_std::StdDriver;

const SLICE: Duration = Duration::from_millis(4);

fn counter() -> ComponentFn {
    component_fn(|props| {
        let label = match props.get("label") {
            Some(value) => value.to_string(),
            None => "count".to_string(),
        };
        let (count, set_count) = use_state(0i64)?;
        use_effect(deps![count], move || {
            debug!("counter value is now {count}");
        })?;
        let on_click = move || set_count.set(|count| count + 1);
        Ok(Element::host(
            "button",
            Props::new()
                .attr("id", "increment")
                .on("click", on_click)
                .child(Element::text(format!("{label}: {count}"))),
        ))
    })
}

/// Drains scheduled work in cooperative slices, the way a host idle loop
/// would between frames.
fn pump(driver: &StdDriver, runtime: &mut Runtime<MemoryHost>) -> Result<(), RenderError> {
    while driver.take_work_request() || runtime.needs_work() {
        let mut slices = 0;
        loop {
            slices += 1;
            match driver.pump(runtime, SLICE)? {
                WorkStatus::Yielded => continue,
                WorkStatus::Idle => break,
            }
        }
        debug!("went idle after {slices} slice(s)");
    }
    Ok(())
}

fn button_node(runtime: &Runtime<MemoryHost>, container: HostNodeId) -> HostNodeId {
    let section = runtime.host().children_of(container).expect("container")[0];
    runtime.host().children_of(section).expect("section")[0]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let driver = StdDriver::new();
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let mut runtime = driver.runtime(host);

    let counter = counter();
    runtime.render(
        Element::host(
            "section",
            Props::new()
                .attr("id", "app")
                .child(Element::component(&counter, Props::new().attr("label", "clicks"))),
        ),
        container,
    );
    pump(&driver, &mut runtime)?;
    info!("mounted:\n{}", runtime.host().dump_tree(Some(container)));

    let button = button_node(&runtime, container);
    for click in 1..=3 {
        runtime.host().dispatch(button, "click")?;
        pump(&driver, &mut runtime)?;
        let text = runtime.host().children_of(button)?[0];
        info!(
            "after click {click}: {}",
            runtime.host().text_of(text)?.unwrap_or_default()
        );
    }

    println!("{}", runtime.host().dump_tree(Some(container)));
    Ok(())
}
