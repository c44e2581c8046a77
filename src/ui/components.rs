/// Reusable UI components

use yew::prelude::*;

use crate::favicon::{acronym, invert_color};

#[derive(Properties, PartialEq)]
pub struct TopicDotProps {
    pub color: String,
    pub title: String,
}

/// The round Topic marker: colored disc carrying the title's acronym.
#[function_component(TopicDot)]
pub fn topic_dot(props: &TopicDotProps) -> Html {
    let text_color = invert_color(&props.color).unwrap_or_else(|_| "#ffffff".to_string());
    let style = format!(
        "display: inline-flex; align-items: center; justify-content: center; width: 28px; height: 28px; border-radius: 50%; font-weight: bold; font-size: 12px; background-color: {}; color: {};",
        props.color, text_color
    );

    html! {
        <span style={style}>{acronym(&props.title)}</span>
    }
}

#[derive(Properties, PartialEq)]
pub struct OpenBadgeProps {
    #[prop_or(false)]
    pub visible: bool,
}

/// Small "Open" pill shown next to Topics bound to a live window.
#[function_component(OpenBadge)]
pub fn open_badge(props: &OpenBadgeProps) -> Html {
    if !props.visible {
        return html! {};
    }
    html! {
        <span class="topic-open-badge" style="margin-left: 6px; padding: 1px 6px; border-radius: 8px; font-size: 10px; background-color: #1b5e20; color: white;">
            {"Open"}
        </span>
    }
}

#[derive(Properties, PartialEq)]
pub struct EmptyStateProps {
    pub message: String,
}

#[function_component(EmptyState)]
pub fn empty_state(props: &EmptyStateProps) -> Html {
    html! {
        <p style="opacity: 0.6; font-size: 13px; padding: 8px;">{&props.message}</p>
    }
}
