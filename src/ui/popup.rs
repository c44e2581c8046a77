/// Popup UI: one instance per browser window, sidebar + tab list

use patternfly_yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlInputElement;
use yew::prelude::*;

use crate::background::ensure_singleton_tab;
use crate::browser::{subscribe_bus_events, BrowserBackend, BrowserHost, RuntimeBus};
use crate::config::ExtensionConfig;
use crate::events::{BusEvent, EventBus};
use crate::host::{CreateTab, TabUpdate, WindowHost};
use crate::lifecycle::{
    add_favorite, convert_window_to_topic, create_topic, load_topic, recolor_topic, remove_favorite,
    rename_topic, restore_topic_tabs, trash_topic, LoadOutcome,
};
use crate::mirror::SyncGate;
use crate::store::TopicStore;
use crate::topic::{Favorite, TopicId};
use crate::ui::components::{EmptyState, OpenBadge, TopicDot};
use crate::util::now_ms;
use crate::view::{handle_event, ViewState};
use crate::Result;

/// Case-insensitive substring filter fed by the search bar.
pub fn filter_matches(title: &str, url: &str, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let needle = term.to_uppercase();
    title.to_uppercase().contains(&needle) || url.to_uppercase().contains(&needle)
}

#[derive(Clone, PartialEq)]
enum AppState {
    Loading,
    Idle,
    Error(String),
}

fn store() -> TopicStore<BrowserBackend> {
    TopicStore::new(BrowserBackend)
}

/// Startup for this window's instance: build the view, and when the window
/// was just opened for a Topic, restore its saved tabs before anything else.
async fn startup() -> Result<ViewState> {
    let host = BrowserHost::new();
    let mut view = ViewState::bootstrap(&store(), &host).await?;
    if let Some(topic_id) = view.current_topic {
        if let Some(topic) = store().get(topic_id).await? {
            if restore_topic_tabs(&host, &topic, view.current_window).await? {
                view.tabs = host.window_tabs(view.current_window).await?;
            }
        }
    }
    Ok(view)
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| AppState::Loading);
    let version = use_state(|| 0u32);
    let view = use_mut_ref(|| None::<ViewState>);
    let gate = use_mut_ref(SyncGate::new);
    let search_term = use_state(String::new);
    let show_add_form = use_state(|| false);
    let new_name = use_state(String::new);
    let new_color = use_state(|| "#ff0000".to_string());
    let dark_theme = use_state(|| false);

    // Bootstrap + bus subscription on mount
    {
        let state = state.clone();
        let version = version.clone();
        let view = view.clone();
        let gate = gate.clone();
        let dark_theme = dark_theme.clone();
        use_effect_with((), move |_| {
            {
                let state = state.clone();
                let version = version.clone();
                let view = view.clone();
                let dark_theme = dark_theme.clone();
                spawn_local(async move {
                    if let Ok(config) = ExtensionConfig::load(&BrowserBackend).await {
                        dark_theme.set(config.dark_theme_enabled);
                    }
                    match startup().await {
                        Ok(initial) => {
                            *view.borrow_mut() = Some(initial);
                            state.set(AppState::Idle);
                            version.set(*version + 1);
                        }
                        Err(err) => {
                            state.set(AppState::Error(format!("Failed to start: {}", err)));
                        }
                    }
                });
            }
            subscribe_bus_events(move |event| {
                let version = version.clone();
                let view = view.clone();
                let gate = gate.clone();
                spawn_local(async move {
                    let current = view.borrow().clone();
                    if let Some(mut model) = current {
                        let host = BrowserHost::new();
                        handle_event(&mut model, &store(), &host, &RuntimeBus, &gate.borrow(), &event)
                            .await;
                        *view.borrow_mut() = Some(model);
                        version.set(*version + 1);
                    }
                });
            });
            || ()
        });
    }

    // Re-render helper: apply events produced by our own operations locally;
    // runtime messages do not loop back to the page that sent them.
    let apply_local = {
        let view = view.clone();
        let version = version.clone();
        move |events: Vec<BusEvent>| {
            if let Some(model) = view.borrow_mut().as_mut() {
                for event in &events {
                    model.apply(event);
                }
            }
            version.set(*version + 1);
        }
    };

    let on_toggle_add_form = {
        let show_add_form = show_add_form.clone();
        Callback::from(move |_| show_add_form.set(!*show_add_form))
    };

    let on_toggle_theme = {
        let dark_theme = dark_theme.clone();
        Callback::from(move |_| {
            let enabled = !*dark_theme;
            dark_theme.set(enabled);
            spawn_local(async move {
                let config = ExtensionConfig {
                    dark_theme_enabled: enabled,
                };
                let _ = config.save(&BrowserBackend).await;
            });
        })
    };

    let on_create_topic = {
        let state = state.clone();
        let show_add_form = show_add_form.clone();
        let new_name = new_name.clone();
        let new_color = new_color.clone();
        let apply_local = apply_local.clone();
        Callback::from(move |_| {
            let state = state.clone();
            let show_add_form = show_add_form.clone();
            let name = (*new_name).clone();
            let color = (*new_color).clone();
            let new_name = new_name.clone();
            let apply_local = apply_local.clone();
            spawn_local(async move {
                match create_topic(&store(), &RuntimeBus, &name, &color).await {
                    Ok(topic) => {
                        apply_local(vec![BusEvent::TopicAdd { topic }]);
                        new_name.set(String::new());
                        show_add_form.set(false);
                        state.set(AppState::Idle);
                    }
                    Err(err) => {
                        // no state was persisted; surface for correction
                        state.set(AppState::Error(format!("Unable to store Topic: {}", err)));
                    }
                }
            });
        })
    };

    let on_load_topic = {
        let state = state.clone();
        let apply_local = apply_local.clone();
        move |topic_id: TopicId| {
            let state = state.clone();
            let apply_local = apply_local.clone();
            Callback::from(move |_| {
                let state = state.clone();
                let apply_local = apply_local.clone();
                spawn_local(async move {
                    let host = BrowserHost::new();
                    match load_topic(&store(), &host, &RuntimeBus, topic_id).await {
                        Ok(LoadOutcome::Opened(window_id)) => {
                            apply_local(vec![BusEvent::TopicLoaded {
                                id: topic_id,
                                window_id,
                            }]);
                        }
                        Ok(LoadOutcome::Focused(_)) => {}
                        Err(err) => state.set(AppState::Error(format!("Topic load failed: {}", err))),
                    }
                });
            })
        }
    };

    let on_focus_window = move |window_id: i32| {
        Callback::from(move |_| {
            spawn_local(async move {
                let host = BrowserHost::new();
                if host.focus_window(window_id).await.is_ok() {
                    let _ = ensure_singleton_tab(&host, window_id).await;
                }
            });
        })
    };

    let on_new_window = {
        Callback::from(move |_| {
            spawn_local(async move {
                RuntimeBus.broadcast(&BusEvent::CreateWindow).await;
            });
        })
    };

    let on_convert_window = {
        let state = state.clone();
        let view = view.clone();
        let apply_local = apply_local.clone();
        Callback::from(move |_| {
            let Some(window_id) = view.borrow().as_ref().map(|v| v.current_window) else {
                return;
            };
            let state = state.clone();
            let apply_local = apply_local.clone();
            spawn_local(async move {
                let host = BrowserHost::new();
                match convert_window_to_topic(&store(), &host, &RuntimeBus, window_id).await {
                    Ok(topic) => {
                        apply_local(vec![
                            BusEvent::TopicAdd { topic },
                            BusEvent::WindowRemoved {
                                window_id,
                                converted: true,
                            },
                        ]);
                    }
                    Err(err) => state.set(AppState::Error(format!("Convert failed: {}", err))),
                }
            });
        })
    };

    let on_trash_topic = {
        let state = state.clone();
        let apply_local = apply_local.clone();
        move |topic_id: TopicId| {
            let state = state.clone();
            let apply_local = apply_local.clone();
            Callback::from(move |_| {
                let state = state.clone();
                let apply_local = apply_local.clone();
                spawn_local(async move {
                    let host = BrowserHost::new();
                    match trash_topic(&store(), &host, &RuntimeBus, topic_id).await {
                        Ok(()) => apply_local(vec![BusEvent::TopicRemove { id: topic_id }]),
                        Err(err) => state.set(AppState::Error(format!("Trash failed: {}", err))),
                    }
                });
            })
        }
    };

    let on_rename = {
        let state = state.clone();
        let view = view.clone();
        let apply_local = apply_local.clone();
        Callback::from(move |event: Event| {
            let Some(input) = event.target_dyn_into::<HtmlInputElement>() else {
                return;
            };
            let Some(topic_id) = view.borrow().as_ref().and_then(|v| v.current_topic) else {
                return;
            };
            let name = input.value();
            let state = state.clone();
            let apply_local = apply_local.clone();
            spawn_local(async move {
                match rename_topic(&store(), &RuntimeBus, topic_id, &name).await {
                    Ok(()) => apply_local(vec![BusEvent::TopicInfoUpdated {
                        topic_id,
                        name: Some(name),
                        color: None,
                        tabs: None,
                    }]),
                    // the input snaps back to the stored name on re-render
                    Err(err) => state.set(AppState::Error(format!("Rename failed: {}", err))),
                }
            });
        })
    };

    let on_recolor = {
        let state = state.clone();
        let view = view.clone();
        let apply_local = apply_local.clone();
        Callback::from(move |event: Event| {
            let Some(input) = event.target_dyn_into::<HtmlInputElement>() else {
                return;
            };
            let Some(topic_id) = view.borrow().as_ref().and_then(|v| v.current_topic) else {
                return;
            };
            let color = input.value();
            let state = state.clone();
            let apply_local = apply_local.clone();
            spawn_local(async move {
                match recolor_topic(&store(), &RuntimeBus, topic_id, &color).await {
                    Ok(()) => apply_local(vec![BusEvent::TopicInfoUpdated {
                        topic_id,
                        name: None,
                        color: Some(color),
                        tabs: None,
                    }]),
                    Err(err) => state.set(AppState::Error(format!("Recolor failed: {}", err))),
                }
            });
        })
    };

    let on_add_tab = {
        Callback::from(move |_| {
            spawn_local(async move {
                let host = BrowserHost::new();
                let _ = host.create_tab(CreateTab::default()).await;
            });
        })
    };

    let on_search = {
        let search_term = search_term.clone();
        Callback::from(move |event: InputEvent| {
            if let Some(input) = event.target_dyn_into::<HtmlInputElement>() {
                search_term.set(input.value());
            }
        })
    };

    let on_name_input = {
        let new_name = new_name.clone();
        Callback::from(move |event: InputEvent| {
            if let Some(input) = event.target_dyn_into::<HtmlInputElement>() {
                new_name.set(input.value());
            }
        })
    };

    let on_color_input = {
        let new_color = new_color.clone();
        Callback::from(move |event: InputEvent| {
            if let Some(input) = event.target_dyn_into::<HtmlInputElement>() {
                new_color.set(input.value());
            }
        })
    };

    let on_toggle_favorite = {
        let view = view.clone();
        let version = version.clone();
        move |title: String, url: String| {
            let view = view.clone();
            let version = version.clone();
            Callback::from(move |_| {
                let Some(topic_id) = view.borrow().as_ref().and_then(|v| v.current_topic) else {
                    return;
                };
                let title = title.clone();
                let url = url.clone();
                let view = view.clone();
                let version = version.clone();
                spawn_local(async move {
                    let store = store();
                    let already = view.borrow().as_ref().is_some_and(|v| {
                        v.topics
                            .iter()
                            .find(|t| t.id == topic_id)
                            .is_some_and(|t| t.favorites.iter().any(|f| f.url == url))
                    });
                    let result = if already {
                        remove_favorite(&store, topic_id, &url).await
                    } else {
                        add_favorite(
                            &store,
                            topic_id,
                            Favorite {
                                created_time: now_ms(),
                                title,
                                url,
                                fav_src: String::new(),
                            },
                        )
                        .await
                    };
                    if let Ok(favorites) = result {
                        if let Some(model) = view.borrow_mut().as_mut() {
                            if let Some(topic) =
                                model.topics.iter_mut().find(|t| t.id == topic_id)
                            {
                                topic.favorites = favorites;
                            }
                        }
                        version.set(*version + 1);
                    }
                });
            })
        }
    };

    let on_tab_activate = move |tab_id: i32| {
        Callback::from(move |_| {
            spawn_local(async move {
                let host = BrowserHost::new();
                let _ = host
                    .update_tab(
                        tab_id,
                        TabUpdate {
                            active: Some(true),
                            ..Default::default()
                        },
                    )
                    .await;
            });
        })
    };

    let on_tab_close = move |tab_id: i32| {
        Callback::from(move |_| {
            spawn_local(async move {
                let host = BrowserHost::new();
                let _ = host.remove_tab(tab_id).await;
            });
        })
    };

    let on_tab_toggle_pin = move |tab_id: i32, pinned: bool| {
        Callback::from(move |_| {
            spawn_local(async move {
                let host = BrowserHost::new();
                let _ = host
                    .update_tab(
                        tab_id,
                        TabUpdate {
                            pinned: Some(!pinned),
                            ..Default::default()
                        },
                    )
                    .await;
            });
        })
    };

    let on_open_favorite = move |url: String| {
        Callback::from(move |_| {
            let url = url.clone();
            spawn_local(async move {
                let host = BrowserHost::new();
                let _ = host
                    .create_tab(CreateTab {
                        window_id: None,
                        url: Some(url),
                        active: true,
                        pinned: false,
                    })
                    .await;
            });
        })
    };

    let model = view.borrow().clone();
    let _ = *version; // render depends on the mutation counter
    let root_class = if *dark_theme {
        "popup-root theme-dark"
    } else {
        "popup-root"
    };

    html! {
        <div class={root_class} style="display: flex; gap: 16px; padding: 12px;">
            // Sidebar: Topics and plain browsing windows
            <nav style="width: 290px; flex-shrink: 0;">
                <h2 style="font-size: 16px;">{"Topics"}</h2>
                {match &model {
                    Some(model) => html! {
                        <ul style="list-style: none; padding: 0;">
                            {for model.topics.iter().map(|topic| {
                                let is_current = model.current_topic == Some(topic.id);
                                html! {
                                    <li key={topic.id} style="display: flex; align-items: center; gap: 8px; padding: 4px;">
                                        <span onclick={on_load_topic(topic.id)} style="cursor: pointer; display: flex; align-items: center; gap: 8px; flex-grow: 1;">
                                            <TopicDot color={topic.color.clone()} title={topic.name.clone()} />
                                            <span>
                                                <div style="font-size: 14px;">{&topic.name}</div>
                                                <div style="font-size: 11px; opacity: 0.7;">{topic.info_line()}</div>
                                            </span>
                                        </span>
                                        <OpenBadge visible={topic.window_id.is_some()} />
                                        if is_current {
                                            <Button variant={ButtonVariant::Link} onclick={on_trash_topic(topic.id)}>
                                                {"🗑"}
                                            </Button>
                                        }
                                    </li>
                                }
                            })}
                        </ul>
                    },
                    None => html! {},
                }}

                if *show_add_form {
                    <div style="padding: 8px; border: 1px solid #ccc; border-radius: 4px;">
                        <input
                            type="text"
                            placeholder="Topic name (3-32 characters)"
                            value={(*new_name).clone()}
                            oninput={on_name_input}
                            minlength="3"
                            maxlength="32"
                        />
                        <input type="color" value={(*new_color).clone()} oninput={on_color_input} />
                        <Button variant={ButtonVariant::Primary} onclick={on_create_topic}>
                            {"Create"}
                        </Button>
                    </div>
                }
                <Button variant={ButtonVariant::Secondary} onclick={on_toggle_add_form} block={true}>
                    {"➕ Add Topic"}
                </Button>

                <h2 style="font-size: 16px; margin-top: 16px;">{"Windows"}</h2>
                {match &model {
                    Some(model) if !model.windows.is_empty() => html! {
                        <ul style="list-style: none; padding: 0;">
                            {for model.windows.iter().map(|window| {
                                let title = model
                                    .titles
                                    .get(&window.id)
                                    .cloned()
                                    .unwrap_or_else(|| "New Window".to_string());
                                html! {
                                    <li key={window.id} onclick={on_focus_window(window.id)} style="cursor: pointer; padding: 4px;">
                                        {title}
                                    </li>
                                }
                            })}
                        </ul>
                    },
                    Some(_) => html! {
                        <EmptyState message={"No plain windows open".to_string()} />
                    },
                    None => html! {},
                }}
                <Button variant={ButtonVariant::Secondary} onclick={on_new_window} block={true}>
                    {"🪟 New Window"}
                </Button>

                <label style="display: block; margin-top: 16px; font-size: 13px;">
                    <input type="checkbox" checked={*dark_theme} onchange={on_toggle_theme} />
                    {" Dark theme"}
                </label>
            </nav>

            // Main: current window's tabs (and favorites for a Topic)
            <main style="flex-grow: 1;">
                {match &*state {
                    AppState::Loading => html! { <Spinner /> },
                    AppState::Error(err) => html! {
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    },
                    AppState::Idle => html! {},
                }}

                {match &model {
                    Some(model) => {
                        let current_topic = model
                            .current_topic
                            .and_then(|id| model.topics.iter().find(|t| t.id == id));
                        html! {
                            <>
                                {match current_topic {
                                    Some(topic) => html! {
                                        <div style="display: flex; align-items: center; gap: 12px;">
                                            <input
                                                type="text"
                                                value={topic.name.clone()}
                                                onchange={on_rename.clone()}
                                                maxlength="32"
                                                style="font-size: 1.6em; border: none; background: unset;"
                                            />
                                            <input type="color" value={topic.color.clone()} onchange={on_recolor.clone()} />
                                        </div>
                                    },
                                    None => html! {
                                        <div style="display: flex; align-items: center; gap: 12px;">
                                            <h1 style="font-size: 1.6em;">
                                                {model.titles.get(&model.current_window).cloned().unwrap_or_else(|| "New Window".to_string())}
                                            </h1>
                                            <Button variant={ButtonVariant::Secondary} onclick={on_convert_window.clone()}>
                                                {"💾 Save as Topic"}
                                            </Button>
                                        </div>
                                    },
                                }}

                                <input
                                    type="search"
                                    placeholder="Search tabs (press 's')"
                                    oninput={on_search.clone()}
                                    style="width: 60%; margin: 8px 0;"
                                />

                                <ul style="list-style: none; padding: 0;">
                                    {for model
                                        .tabs
                                        .iter()
                                        .filter(|tab| filter_matches(&tab.title, &tab.url, &search_term))
                                        .filter(|tab| {
                                            // hide our own pinned UI page
                                            !tab.url.starts_with("chrome-extension://")
                                                && !tab.url.starts_with("moz-extension://")
                                        })
                                        .map(|tab| {
                                            let favorite = current_topic.is_some_and(|t| {
                                                t.favorites.iter().any(|f| f.url == tab.url)
                                            });
                                            html! {
                                                <li key={tab.id} style="display: flex; align-items: center; gap: 8px; padding: 2px 0;">
                                                    <span onclick={on_tab_activate(tab.id)} style="cursor: pointer; flex-grow: 1;">
                                                        <div style="font-size: 14px;">{&tab.title}</div>
                                                        <div style="font-size: 11px; opacity: 0.7;">{&tab.url}</div>
                                                    </span>
                                                    if current_topic.is_some() {
                                                        <Button variant={ButtonVariant::Link} onclick={on_toggle_favorite(tab.title.clone(), tab.url.clone())}>
                                                            {if favorite { "★" } else { "☆" }}
                                                        </Button>
                                                    }
                                                    <Button variant={ButtonVariant::Link} onclick={on_tab_toggle_pin(tab.id, tab.pinned)}>
                                                        {if tab.pinned { "📌" } else { "📍" }}
                                                    </Button>
                                                    <Button variant={ButtonVariant::Link} onclick={on_tab_close(tab.id)}>
                                                        {"✕"}
                                                    </Button>
                                                </li>
                                            }
                                        })}
                                </ul>
                                <Button variant={ButtonVariant::Secondary} onclick={on_add_tab.clone()}>
                                    {"➕ New Tab"}
                                </Button>

                                {match current_topic {
                                    Some(topic) if !topic.favorites.is_empty() => html! {
                                        <>
                                            <h2 style="font-size: 15px; margin-top: 16px;">{"Saved tabs"}</h2>
                                            <ul style="list-style: none; padding: 0;">
                                                {for topic
                                                    .favorites
                                                    .iter()
                                                    .filter(|fav| filter_matches(&fav.title, &fav.url, &search_term))
                                                    .map(|fav| html! {
                                                        <li key={fav.url.clone()} style="display: flex; align-items: center; gap: 8px; padding: 2px 0;">
                                                            <span onclick={on_open_favorite(fav.url.clone())} style="cursor: pointer; flex-grow: 1;">
                                                                <div style="font-size: 14px;">{&fav.title}</div>
                                                                <div style="font-size: 11px; opacity: 0.7;">{&fav.url}</div>
                                                            </span>
                                                            <Button variant={ButtonVariant::Link} onclick={on_toggle_favorite(fav.title.clone(), fav.url.clone())}>
                                                                {"✕"}
                                                            </Button>
                                                        </li>
                                                    })}
                                            </ul>
                                        </>
                                    },
                                    _ => html! {},
                                }}
                            </>
                        }
                    }
                    None => html! {},
                }}
            </main>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::filter_matches;

    #[test]
    fn test_filter_matches_title_and_url() {
        assert!(filter_matches("Rust Blog", "https://blog.rust-lang.org", ""));
        assert!(filter_matches("Rust Blog", "https://blog.rust-lang.org", "rust"));
        assert!(filter_matches("Rust Blog", "https://blog.rust-lang.org", "BLOG.R"));
        assert!(!filter_matches("Rust Blog", "https://blog.rust-lang.org", "python"));
    }
}
