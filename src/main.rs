// WebP Batch Converter
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod compression;
mod config;
mod converter;
mod error;
mod export;
mod preview;
mod registry;
mod source;

use compression::{Recompressor, WebpCompressor};
use config::AppConfig;
use converter::{BatchConverter, ConversionJob, ConversionSettings, ItemOutcome};
use iced::font::{Family, Weight};
use iced::widget::image::{Handle, Image};
use iced::widget::{button, column, container, progress_bar, row, scrollable, slider, text, text_input, Space};
use iced::{executor, Application, Color, Command, Element, Event, Font, Length, Settings, Subscription, Theme};
use registry::{ConversionItem, ItemId, StatusKind};
use source::SourceFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HEADING_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Bold,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const BODY_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Normal,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const THUMBNAIL_SIZE: f32 = 48.0;
const DONE_COLOR: Color = Color::from_rgb(0.3, 0.8, 0.4);
const ERROR_COLOR: Color = Color::from_rgb(0.95, 0.4, 0.4);
const MUTED_COLOR: Color = Color::from_rgb(0.6, 0.6, 0.65);

pub fn main() -> iced::Result {
    init_logging();
    let config = AppConfig::load();

    WebpBatch::run(Settings {
        window: iced::window::Settings {
            size: (680, 760),
            min_size: Some((560, 600)),
            resizable: true,
            decorations: true,
            ..Default::default()
        },
        default_font: BODY_FONT,
        default_text_size: 14.0,
        flags: config,
        ..Default::default()
    })
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

struct WebpBatch {
    config: AppConfig,
    converter: BatchConverter,
    compressor: Arc<dyn Recompressor>,
    quality: u8,
    max_dimension: u32,
    max_dimension_input: String,
    status_message: String,
    last_saved: Option<PathBuf>,
}

#[derive(Debug, Clone)]
enum Message {
    SelectFiles,
    SelectFolder,
    PathsChosen(Vec<PathBuf>),
    SourcesLoaded(Vec<SourceFile>),
    QualityChanged(u8),
    MaxDimensionChanged(String),
    ItemConverted(ItemOutcome),
    Reconvert,
    DownloadItem(ItemId),
    ItemSaved(Result<Option<PathBuf>, String>),
    DownloadAll,
    ArchiveSaved(Result<Option<PathBuf>, String>),
    OpenOutputFolder,
    ClearAll,
}

impl WebpBatch {
    fn settings(&self) -> ConversionSettings {
        ConversionSettings::new(self.quality, self.max_dimension, self.config.max_size_bytes())
    }

    fn dispatch(&self, jobs: Vec<ConversionJob>) -> Command<Message> {
        Command::batch(jobs.into_iter().map(|job| {
            Command::perform(
                converter::convert(job, Arc::clone(&self.compressor)),
                Message::ItemConverted,
            )
        }))
    }

    fn record_save(&mut self, result: Result<Option<PathBuf>, String>) {
        match result {
            Ok(Some(path)) => {
                self.status_message = format!("Saved {}", path.display());
                self.last_saved = Some(path);
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Save failed: {}", e);
                self.status_message = String::from("Save failed");
            }
        }
    }

    fn refresh_status(&mut self) {
        let registry = self.converter.registry();
        self.status_message = match self.converter.progress() {
            Some((settled, total)) => format!("Converting {} of {}", settled, total),
            None if registry.is_batch_settled() => format!(
                "{} converted, {} failed",
                registry.count(StatusKind::Done),
                registry.count(StatusKind::Error)
            ),
            None => String::new(),
        };
    }
}

impl Application for WebpBatch {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = AppConfig;

    fn new(config: AppConfig) -> (Self, Command<Message>) {
        let app = Self {
            quality: config.quality,
            max_dimension: config.max_dimension,
            max_dimension_input: config.max_dimension.to_string(),
            config,
            converter: BatchConverter::new(),
            compressor: Arc::new(WebpCompressor::new()),
            status_message: String::new(),
            last_saved: None,
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from("WebP Batch Converter")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::SelectFiles => {
                return Command::perform(select_files(), Message::PathsChosen);
            }
            Message::SelectFolder => {
                return Command::perform(select_folder(), Message::PathsChosen);
            }
            Message::PathsChosen(paths) => {
                if !paths.is_empty() {
                    return Command::perform(
                        source::load_sources(paths, self.config.recurse_folders),
                        Message::SourcesLoaded,
                    );
                }
            }
            Message::SourcesLoaded(sources) => {
                let jobs = self.converter.add_files(sources, self.settings());
                self.refresh_status();
                return self.dispatch(jobs);
            }
            Message::QualityChanged(quality) => {
                self.quality = quality;
            }
            Message::MaxDimensionChanged(value) => {
                if let Some(dimension) = parse_dimension(&value) {
                    self.max_dimension = dimension;
                }
                self.max_dimension_input = value;
            }
            Message::ItemConverted(outcome) => {
                let jobs = self.converter.apply(outcome, self.settings());
                self.refresh_status();
                return self.dispatch(jobs);
            }
            Message::Reconvert => {
                if self.converter.registry().is_batch_settled() {
                    let jobs = self.converter.reconvert(self.settings());
                    self.refresh_status();
                    return self.dispatch(jobs);
                }
            }
            Message::DownloadItem(id) => {
                if let Some(file) = self.converter.converted(id) {
                    return Command::perform(save_item(file), Message::ItemSaved);
                }
            }
            Message::ItemSaved(result) => {
                self.record_save(result);
            }
            Message::ArchiveSaved(result) => {
                self.converter.finish_archive();
                self.record_save(result);
            }
            Message::DownloadAll => {
                if let Some(entries) = self.converter.begin_archive() {
                    return Command::perform(save_all(entries), Message::ArchiveSaved);
                }
            }
            Message::OpenOutputFolder => {
                if let Some(folder) = self.last_saved.as_deref().and_then(Path::parent) {
                    if let Err(e) = open::that(folder) {
                        log::warn!("Could not open {}: {}", folder.display(), e);
                    }
                }
            }
            Message::ClearAll => {
                self.converter.clear();
                self.refresh_status();
            }
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        iced::subscription::events_with(|event, _status| match event {
            Event::Window(iced::window::Event::FileDropped(path)) => {
                Some(Message::PathsChosen(vec![path]))
            }
            _ => None,
        })
    }

    fn view(&self) -> Element<Message> {
        let registry = self.converter.registry();

        let header = column![
            text("WebP Batch Converter").size(24).font(HEADING_FONT),
            text("Convert many images to WebP at once.")
                .size(13)
                .style(MUTED_COLOR),
        ]
        .spacing(4);

        let pickers = row![
            button("Select Files")
                .on_press(Message::SelectFiles)
                .padding([6, 12]),
            button("Select Folder")
                .on_press(Message::SelectFolder)
                .padding([6, 12]),
        ]
        .spacing(8);

        if registry.is_empty() {
            let drop_zone = container(
                column![
                    text("Drop images here").size(20).font(HEADING_FONT),
                    text("or").size(13).style(MUTED_COLOR),
                    pickers,
                ]
                .spacing(12)
                .align_items(iced::Alignment::Center),
            )
            .width(Length::Fill)
            .padding(48)
            .center_x()
            .style(iced::theme::Container::Box);

            return container(column![header, Space::with_height(24), drop_zone].padding(16))
                .width(Length::Fill)
                .height(Length::Fill)
                .into();
        }

        let settings = row![
            column![
                text("Quality").size(16).font(HEADING_FONT),
                row![
                    slider(1..=100, self.quality, Message::QualityChanged).width(Length::Fill),
                    text(self.quality.to_string()).size(14).width(36),
                ]
                .spacing(8)
                .align_items(iced::Alignment::Center),
            ]
            .spacing(6)
            .width(Length::FillPortion(1)),
            column![
                text("Max dimension").size(16).font(HEADING_FONT),
                row![
                    text_input("1920", &self.max_dimension_input)
                        .on_input(Message::MaxDimensionChanged)
                        .width(Length::Fixed(100.0))
                        .padding(4)
                        .size(13),
                    text("px").size(13),
                ]
                .spacing(6)
                .align_items(iced::Alignment::Center),
            ]
            .spacing(6)
            .width(Length::FillPortion(1)),
        ]
        .spacing(24);

        let items: Vec<Element<Message>> = registry
            .items()
            .iter()
            .map(|item| self.item_row(item))
            .collect();
        let list = container(scrollable(column(items).spacing(6)).height(Length::Fill))
            .style(iced::theme::Container::Box)
            .padding(8)
            .height(Length::Fill);

        let reconvert = button("Reconvert with current settings").padding([8, 16]);
        let reconvert = if registry.is_batch_settled() {
            reconvert.on_press(Message::Reconvert)
        } else {
            reconvert
        };

        let download_all = if self.converter.is_archiving() {
            button("Zipping...").padding([8, 16])
        } else if registry.has_any_done() {
            button("Download all as ZIP")
                .on_press(Message::DownloadAll)
                .padding([8, 16])
        } else {
            button("Download all as ZIP").padding([8, 16])
        };

        let open_output = button("Open Output").padding([8, 16]);
        let open_output = if self.last_saved.is_some() {
            open_output.on_press(Message::OpenOutputFolder)
        } else {
            open_output
        };

        let actions = row![
            reconvert,
            download_all,
            button("Clear all")
                .on_press(Message::ClearAll)
                .padding([8, 16]),
            open_output,
        ]
        .spacing(8);

        let progress_section = match self.converter.progress() {
            Some((settled, total)) => column![
                progress_bar(0.0..=total as f32, settled as f32).height(Length::Fixed(6.0)),
                text(&self.status_message).size(12),
            ]
            .spacing(4),
            None => column![text(&self.status_message).size(12)],
        };

        let content = column![
            header,
            Space::with_height(12),
            pickers,
            Space::with_height(12),
            settings,
            Space::with_height(12),
            list,
            Space::with_height(12),
            actions,
            Space::with_height(8),
            progress_section,
        ]
        .padding(16);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

impl WebpBatch {
    fn item_row<'a>(&'a self, item: &'a ConversionItem) -> Element<'a, Message> {
        let registry = self.converter.registry();
        let source = item.source();

        let thumbnail: Element<Message> = match registry.preview(item.source_preview()) {
            Some(handle) => Image::<Handle>::new(handle.clone())
                .width(Length::Fixed(THUMBNAIL_SIZE))
                .height(Length::Fixed(THUMBNAIL_SIZE))
                .into(),
            None => Space::new(Length::Fixed(THUMBNAIL_SIZE), Length::Fixed(THUMBNAIL_SIZE)).into(),
        };

        let original = column![
            text(&source.name).size(13).font(HEADING_FONT),
            text(format_kb(source.size)).size(12).style(MUTED_COLOR),
        ]
        .spacing(2)
        .width(Length::Fill);

        let outcome: Element<Message> = match item.kind() {
            StatusKind::Pending => text("Waiting").size(12).style(MUTED_COLOR).into(),
            StatusKind::Converting => text("Converting...").size(12).into(),
            StatusKind::Done => {
                let converted_preview: Element<Message> = match item
                    .result_preview()
                    .and_then(|id| registry.preview(id))
                {
                    Some(handle) => Image::<Handle>::new(handle.clone())
                        .width(Length::Fixed(THUMBNAIL_SIZE))
                        .height(Length::Fixed(THUMBNAIL_SIZE))
                        .into(),
                    None => Space::with_width(0).into(),
                };
                match item.result() {
                    Some(result) => row![
                        converted_preview,
                        column![
                            text(&result.name).size(13),
                            text(format!(
                                "{} ({:.0}%)",
                                format_kb(result.size()),
                                size_ratio(source.size, result.size()) * 100.0
                            ))
                            .size(12)
                            .style(DONE_COLOR),
                        ]
                        .spacing(2),
                    ]
                    .spacing(8)
                    .into(),
                    None => Space::with_width(0).into(),
                }
            }
            StatusKind::Error => text(item.error().unwrap_or(converter::CONVERSION_FAILED))
                .size(12)
                .style(ERROR_COLOR)
                .into(),
        };

        let download: Element<Message> = if item.kind() == StatusKind::Done {
            button("Download")
                .on_press(Message::DownloadItem(item.id()))
                .padding([4, 10])
                .into()
        } else {
            Space::with_width(0).into()
        };

        row![
            thumbnail,
            original,
            container(outcome).width(Length::Fixed(240.0)),
            download,
        ]
        .spacing(12)
        .align_items(iced::Alignment::Center)
        .into()
    }
}

// Helper functions
async fn select_files() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .add_filter("Images", source::PICKER_EXTENSIONS)
        .pick_files()
        .await
        .map(|handles| handles.iter().map(|h| h.path().to_path_buf()).collect())
        .unwrap_or_default()
}

async fn select_folder() -> Vec<PathBuf> {
    rfd::AsyncFileDialog::new()
        .pick_folder()
        .await
        .map(|handle| vec![handle.path().to_path_buf()])
        .unwrap_or_default()
}

async fn save_item(file: registry::ConvertedFile) -> Result<Option<PathBuf>, String> {
    let Some(handle) = rfd::AsyncFileDialog::new()
        .set_file_name(&file.name)
        .save_file()
        .await
    else {
        return Ok(None);
    };
    export::save_converted(file, handle.path().to_path_buf())
        .await
        .map(Some)
        .map_err(|e| e.to_string())
}

async fn save_all(entries: Vec<export::ArchiveEntry>) -> Result<Option<PathBuf>, String> {
    let name = export::archive_file_name(chrono::Utc::now());
    let Some(handle) = rfd::AsyncFileDialog::new()
        .add_filter("ZIP archive", &["zip"])
        .set_file_name(&name)
        .save_file()
        .await
    else {
        return Ok(None);
    };
    export::save_archive(entries, handle.path().to_path_buf())
        .await
        .map(Some)
        .map_err(|e| e.to_string())
}

fn parse_dimension(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|d| *d > 0)
}

fn format_kb(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

fn size_ratio(original: u64, converted: u64) -> f32 {
    if original > 0 {
        converted as f32 / original as f32
    } else {
        0.0
    }
}
