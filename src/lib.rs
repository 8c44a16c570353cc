// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

pub mod cache;
pub mod config;
pub mod favourites;
pub mod pipeline;
pub mod playlist;
pub mod pluto_api;
pub mod xmltv;

pub use cache::GuideCache;
pub use config::Config;
pub use favourites::FavouritesFilter;
pub use playlist::PlaylistBuilder;
pub use pluto_api::PlutoApi;
pub use xmltv::GuideBuilder;
