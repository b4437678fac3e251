use std::time::SystemTime;

use iocraft::prelude::*;
use tokio::sync::watch;

use crate::page::{Container, Page, TabSet};
use crate::rest_types::{MemoryRow, MemoryType, MessageRow, Stats};

const PROGRESS_WIDTH: usize = 40;

fn format_timestamp(t: SystemTime) -> String {
    humantime::format_rfc3339_seconds(t).to_string()
}

#[derive(Default, Props)]
pub struct MessageListProps {
    pub messages: Vec<MessageRow>,
}

#[component]
pub fn MessageList(props: &MessageListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.messages.iter().map(|message| {
                let heading = match &message.relationship {
                    Some(relationship) if !relationship.is_empty() => {
                        format!("{} ({})", message.name, relationship)
                    }
                    _ => message.name.clone(),
                };
                element! {
                    View(flex_direction: FlexDirection::Column) {
                        View(flex_direction: FlexDirection::Row) {
                            Text(content: heading, weight: Weight::Bold)
                            #(message.created_at.map(|t| element! {
                                Text(content: format!("  {}", format_timestamp(t)), color: Color::DarkGrey)
                            }))
                        }
                        Text(content: format!("│ {}", message.message))
                    }
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct MemoryListProps {
    pub memories: Vec<MemoryRow>,
}

#[component]
pub fn MemoryList(props: &MemoryListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.memories.iter().map(|memory| {
                let icon = match memory.kind {
                    MemoryType::Photo => "▣",
                    MemoryType::Video => "▶",
                    MemoryType::Text => "✎",
                };
                let caption = memory.caption.clone().filter(|c| !c.is_empty());
                element! {
                    View(flex_direction: FlexDirection::Column) {
                        View(flex_direction: FlexDirection::Row) {
                            Text(content: format!("{icon} "), color: Color::Cyan)
                            Text(content: memory.name.clone().unwrap_or_else(|| "Anonymous".to_string()), weight: Weight::Bold)
                            #(memory.created_at.map(|t| element! {
                                Text(content: format!("  {}", format_timestamp(t)), color: Color::DarkGrey)
                            }))
                        }
                        #(caption.map(|caption| element! {
                            Text(content: format!("│ {}", caption))
                        }))
                        #((!memory.image_url.is_empty()).then(|| element! {
                            Text(content: format!("│ {}", memory.image_url), color: Color::Blue)
                        }))
                    }
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct StatsPanelProps {
    pub stats: Stats,
}

#[component]
pub fn StatsPanel(props: &StatsPanelProps) -> impl Into<AnyElement<'static>> {
    let stats = &props.stats;
    let raised = stats.total_raised.map(|raised| match stats.goal {
        Some(goal) if goal > 0.0 => format!("£{raised:.2} raised of £{goal:.0} goal"),
        _ => format!("£{raised:.2} raised"),
    });

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: format!("Donors:   {}", stats.donor_count))
            Text(content: format!("Messages: {}", stats.message_count))
            Text(content: format!("Photos:   {}", stats.photo_count))
            Text(content: format!("Videos:   {}", stats.video_count))
            #(raised.map(|raised| element! {
                Text(content: raised, color: Color::Green)
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct RowListProps {
    pub rows: Vec<(String, String)>,
}

/// Two-column listing used for gallery folders and images.
#[component]
pub fn RowList(props: &RowListProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            #(props.rows.iter().map(|(label, detail)| {
                element! {
                    View(flex_direction: FlexDirection::Row) {
                        Text(content: label.clone(), weight: Weight::Bold)
                        Text(content: format!("  {}", detail), color: Color::DarkGrey)
                    }
                }
            }))
        }
    }
}

#[derive(Default, Props)]
pub struct TabMenuProps {
    pub tabs: TabSet,
}

#[component]
pub fn TabMenu(props: &TabMenuProps) -> impl Into<AnyElement<'static>> {
    if props.tabs.menu_open() {
        return element! {
            View(flex_direction: FlexDirection::Column) {
                Text(content: "☰ Sections", weight: Weight::Bold)
                #(props.tabs.sections().iter().map(|section| {
                    let marker = if section.visible { "▸" } else { " " };
                    element! {
                        Text(content: format!("{marker} #{}", section.tag))
                    }
                }))
            }
        }
        .into_any();
    }

    element! {
        View(flex_direction: FlexDirection::Row) {
            #(props.tabs.sections().iter().map(|section| {
                if section.visible {
                    element! {
                        View(background_color: Color::Blue) {
                            Text(content: format!(" {} ", section.tag), color: Color::White)
                        }
                    }
                    .into_any()
                } else {
                    element! {
                        Text(content: format!(" {} ", section.tag), color: Color::DarkGrey)
                    }
                    .into_any()
                }
            }))
        }
    }
    .into_any()
}

fn section<T>(
    title: &str,
    container: &Container<T>,
    ready: impl FnOnce(&T) -> AnyElement<'static>,
) -> AnyElement<'static> {
    let body = match container {
        Container::Loading => element! {
            View(flex_direction: FlexDirection::Row) {
                Spinner()
                Text(content: " Loading...")
            }
        }
        .into_any(),
        Container::Ready(rows) => ready(rows),
        Container::Empty(placeholder) => element! {
            Text(content: *placeholder, color: Color::DarkGrey)
        }
        .into_any(),
        Container::Failed(notice) => element! {
            Text(content: *notice, color: Color::Red)
        }
        .into_any(),
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: "│")
            View(flex_direction: FlexDirection::Row) {
                Text(content: "┌ ")
                Text(content: title.to_string(), weight: Weight::Bold)
            }
            #(Some(body))
        }
    }
    .into_any()
}

#[derive(Default, Props)]
pub struct PageViewProps {
    pub page: Page,
}

/// Renders the visible section, or every loaded section from the home tab.
#[component]
pub fn PageView(props: &PageViewProps) -> impl Into<AnyElement<'static>> {
    let page = &props.page;
    let messages = || {
        section("Messages", &page.messages, |rows| {
            element!(MessageList(messages: rows.clone())).into_any()
        })
    };
    let memories = || {
        section("Memories", &page.memories, |rows| {
            element!(MemoryList(memories: rows.clone())).into_any()
        })
    };
    let stats = || {
        section("Celebration so far", &page.stats, |stats| {
            element!(StatsPanel(stats: stats.clone())).into_any()
        })
    };

    let sections = match page.tabs.visible() {
        Some("messages") => vec![messages()],
        Some("memories") => vec![memories()],
        Some("donate") => vec![stats()],
        _ => vec![stats(), messages(), memories()],
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            TabMenu(tabs: page.tabs.clone())
            #(sections)
        }
    }
}

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    pub progress: Option<watch::Receiver<f32>>,
}

#[component]
pub fn ProgressBar(props: &ProgressBarProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut percent = hooks.use_state(|| 0.0f32);
    let progress = props.progress.clone();

    hooks.use_future(async move {
        let Some(mut rx) = progress else {
            return;
        };
        while rx.changed().await.is_ok() {
            let value = *rx.borrow_and_update();
            percent.set(value);
        }
    });

    let value = percent.get().clamp(0.0, 100.0);
    let filled = ((value / 100.0) * PROGRESS_WIDTH as f32).round() as usize;

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: props.title.clone(), weight: Weight::Bold)
            View(flex_direction: FlexDirection::Row) {
                Text(content: "█".repeat(filled), color: Color::Green)
                Text(content: "░".repeat(PROGRESS_WIDTH - filled), color: Color::DarkGrey)
                Text(content: format!(" {value:>5.1}%"))
            }
        }
    }
}

#[derive(Default, Props)]
pub struct SpinnerProps {
    pub color: Option<Color>,
}

#[component]
pub fn Spinner(props: &SpinnerProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut frame = hooks.use_state(|| 0usize);

    hooks.use_future(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
            frame.set((frame.get() + 1) % 4);
        }
    });

    let spinner_chars = ["◐", "◓", "◑", "◒"];
    let current_char = spinner_chars[*frame.read()];
    let color = props.color.unwrap_or(Color::Cyan);

    element! {
        Text(content: current_char, color: color)
    }
}

#[derive(Default, Props)]
pub struct MessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "▲ ", color: Color::Red)
            Text(content: props.message.clone(), color: Color::Red)
        }
    }
}

#[component]
pub fn SuccessMessage(props: &MessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Row) {
            Text(content: "◆ ", color: Color::Green)
            Text(content: props.message.clone())
        }
    }
}

#[derive(Default, Props)]
pub struct InputPromptProps {
    pub prompt: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

#[component]
pub fn InputPrompt(props: &InputPromptProps) -> impl Into<AnyElement<'static>> {
    let prompt = match &props.default {
        Some(default) => format!("{} [{}]", props.prompt, default),
        None => props.prompt.clone(),
    };

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(content: prompt, weight: Weight::Bold)
            #(props.description.as_ref().map(|description| element! {
                Text(content: description.clone(), color: Color::DarkGrey)
            }))
        }
    }
}

#[component]
pub fn ConfigHeader() -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            View(background_color: Color::Blue) {
                Text(content: " celebrate configuration ", color: Color::White)
            }
            Text(content: "Press enter to keep the value shown in brackets.")
        }
    }
}
