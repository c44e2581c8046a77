/// Background controller: keeps exactly one pinned extension UI tab per
/// window and forwards browser-level events onto the bus.
use log::{debug, info};

use crate::events::{BusEvent, EventBus};
use crate::host::{CreateTab, LiveTab, TabUpdate, WindowHost, WindowInfo};
use crate::topic::{TabId, WindowId};
use crate::Result;

/// What the singleton pass did. Re-invocation on a converged window reports
/// `Reasserted { pruned: 0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingletonOutcome {
    /// No UI tab existed; one was created pinned.
    Created,
    /// A UI tab existed; surplus copies closed, state re-asserted.
    Reasserted { pruned: usize },
}

/// Converge the window to exactly one pinned extension UI tab.
///
/// More than one: close all but the first. Zero: create one pinned. Exactly
/// one: re-assert pinned/active/non-discardable (the user may have unpinned
/// it). Repeated invocation reaches a fixed point; it never accumulates
/// tabs.
pub async fn ensure_singleton_tab<H>(host: &H, window_id: WindowId) -> Result<SingletonOutcome>
where
    H: WindowHost,
{
    let ui_url = host.ui_url();
    let ui_tabs: Vec<LiveTab> = host
        .window_tabs(window_id)
        .await?
        .into_iter()
        .filter(|tab| tab.url.starts_with(&ui_url))
        .collect();

    let Some(first) = ui_tabs.first() else {
        host.create_tab(CreateTab {
            window_id: Some(window_id),
            url: Some(ui_url),
            active: true,
            pinned: true,
        })
        .await?;
        debug!("background: created UI tab in window {}", window_id);
        return Ok(SingletonOutcome::Created);
    };

    let mut pruned = 0;
    for surplus in &ui_tabs[1..] {
        host.remove_tab(surplus.id).await?;
        pruned += 1;
        debug!("background: closed surplus UI tab in window {}", window_id);
    }
    host.update_tab(
        first.id,
        TabUpdate {
            active: Some(true),
            pinned: Some(true),
            highlighted: Some(true),
            auto_discardable: Some(false),
        },
    )
    .await?;
    Ok(SingletonOutcome::Reasserted { pruned })
}

/// Service a `CreateWindow` bus request: open a window and give it its UI tab.
pub async fn create_window_with_ui<H>(host: &H) -> Result<WindowInfo>
where
    H: WindowHost,
{
    let window = host.create_window().await?;
    ensure_singleton_tab(host, window.id).await?;
    Ok(window)
}

/// Browser window appeared: converge its UI tab, then tell the instances.
pub async fn on_window_created<H, E>(host: &H, bus: &E, window: WindowInfo) -> Result<()>
where
    H: WindowHost,
    E: EventBus,
{
    ensure_singleton_tab(host, window.id).await?;
    bus.broadcast(&BusEvent::WindowCreated { window }).await;
    Ok(())
}

pub async fn on_window_removed<E>(bus: &E, window_id: WindowId)
where
    E: EventBus,
{
    bus.broadcast(&BusEvent::WindowRemoved {
        window_id,
        converted: false,
    })
    .await;
}

pub async fn on_tab_created<E>(bus: &E, tab: LiveTab)
where
    E: EventBus,
{
    bus.broadcast(&BusEvent::TabCreated { tab }).await;
}

/// Tab removals during a window close are not forwarded; the window-level
/// event covers the whole teardown.
pub async fn on_tab_removed<E>(
    bus: &E,
    tab_id: TabId,
    window_id: WindowId,
    is_window_closing: bool,
) where
    E: EventBus,
{
    if is_window_closing {
        info!(
            "background: tab {} removal folded into window {} close",
            tab_id, window_id
        );
        return;
    }
    bus.broadcast(&BusEvent::TabRemoved { tab_id, window_id }).await;
}

pub async fn on_tab_moved<E>(
    bus: &E,
    tab_id: TabId,
    window_id: WindowId,
    from_index: i32,
    to_index: i32,
) where
    E: EventBus,
{
    bus.broadcast(&BusEvent::TabMoved {
        tab_id,
        window_id,
        from_index,
        to_index,
    })
    .await;
}

pub async fn on_tab_updated<E>(bus: &E, tab: LiveTab, complete: bool)
where
    E: EventBus,
{
    bus.broadcast(&BusEvent::TabUpdated {
        tab_id: tab.id,
        tab,
        complete,
    })
    .await;
}

pub async fn on_tab_replaced<E>(bus: &E, added_tab_id: TabId, removed_tab_id: TabId)
where
    E: EventBus,
{
    bus.broadcast(&BusEvent::TabReplaced {
        added_tab_id,
        removed_tab_id,
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingBus;
    use crate::host::MemoryHost;

    #[tokio::test]
    async fn test_singleton_creates_missing_ui_tab() {
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a/"]);

        let outcome = ensure_singleton_tab(&host, win).await.unwrap();
        assert_eq!(outcome, SingletonOutcome::Created);

        let tabs = host.window_tabs(win).await.unwrap();
        let ui: Vec<&crate::host::LiveTab> = tabs
            .iter()
            .filter(|t| t.url.starts_with(&host.ui_url()))
            .collect();
        assert_eq!(ui.len(), 1);
        assert!(ui[0].pinned);
        assert!(ui[0].active);
    }

    #[tokio::test]
    async fn test_singleton_prunes_duplicates_then_converges() {
        let host = MemoryHost::new();
        let ui = host.ui_url();
        let win = host.open_window(&[ui.as_str(), ui.as_str(), ui.as_str(), "https://a/"]);

        let outcome = ensure_singleton_tab(&host, win).await.unwrap();
        assert_eq!(outcome, SingletonOutcome::Reasserted { pruned: 2 });

        let count = |tabs: &[crate::host::LiveTab]| {
            tabs.iter().filter(|t| t.url.starts_with(&ui)).count()
        };
        assert_eq!(count(&host.window_tabs(win).await.unwrap()), 1);

        // second invocation is a no-op: nothing closed, nothing created
        let outcome = ensure_singleton_tab(&host, win).await.unwrap();
        assert_eq!(outcome, SingletonOutcome::Reasserted { pruned: 0 });
        let tabs = host.window_tabs(win).await.unwrap();
        assert_eq!(count(&tabs), 1);
        assert_eq!(tabs.len(), 2);
    }

    #[tokio::test]
    async fn test_singleton_repins_unpinned_ui_tab() {
        let host = MemoryHost::new();
        let win = host.open_window(&["https://a/"]);
        ensure_singleton_tab(&host, win).await.unwrap();
        let ui_tab = host
            .window_tabs(win)
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.url.starts_with(&host.ui_url()))
            .unwrap();
        // user accidentally unpins
        host.update_tab(
            ui_tab.id,
            TabUpdate {
                pinned: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        ensure_singleton_tab(&host, win).await.unwrap();
        let ui_tab = host
            .window_tabs(win)
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.id == ui_tab.id)
            .unwrap();
        assert!(ui_tab.pinned);
    }

    #[tokio::test]
    async fn test_window_created_forwarding_announces_after_ui() {
        let host = MemoryHost::new();
        let bus = RecordingBus::new();
        let win = host.open_window(&["https://a/"]);
        let window = WindowInfo {
            id: win,
            focused: true,
        };

        on_window_created(&host, &bus, window.clone()).await.unwrap();
        assert_eq!(bus.sent(), vec![BusEvent::WindowCreated { window }]);
        assert_eq!(
            ensure_singleton_tab(&host, win).await.unwrap(),
            SingletonOutcome::Reasserted { pruned: 0 }
        );
    }

    #[tokio::test]
    async fn test_tab_removed_suppressed_while_window_closes() {
        let bus = RecordingBus::new();
        on_tab_removed(&bus, 5, 1, true).await;
        assert!(bus.sent().is_empty());
        on_tab_removed(&bus, 5, 1, false).await;
        assert_eq!(
            bus.sent(),
            vec![BusEvent::TabRemoved {
                tab_id: 5,
                window_id: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_create_window_with_ui() {
        let host = MemoryHost::new();
        let window = create_window_with_ui(&host).await.unwrap();
        let tabs = host.window_tabs(window.id).await.unwrap();
        assert!(tabs
            .iter()
            .any(|t| t.url.starts_with(&host.ui_url()) && t.pinned));
    }
}
