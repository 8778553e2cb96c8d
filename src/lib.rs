/*!
# A.R.G.U.S. Dashboard

Advanced Research Group United Support: a role-gated operations dashboard,
built in Rust.

## Overview

Signed-in users work on three operational domains, each backed by a SQLite
table that is seeded from a CSV file on first use:

- **Cybersecurity**: security incidents (severity, category, status)
- **IT Operations**: service desk tickets and their resolution times
- **Data Science**: metadata of uploaded datasets

Every domain page shows summary metrics, create/update/delete forms, the
full table with CSV and XLSX download, and server-rendered SVG charts. An AI
assistant answers questions about the current data through the Gemini API.

## Roles

| Role | Pages |
|---|---|
| `user` | every domain page and the AI assistant |
| `cybersecurity` | Cybersecurity |
| `data_scientist` | Data Science |
| `it_admin` | IT Operations |

## Architecture

### Storage Layer
- **database**: SQLite store for users and the three domain tables
- **loader**: seed CSV parsing
- **records**: seeded loading, on top of the store

### Domain Layer
- **models**: records, roles, pages and option lists
- **login**: Argon2 credentials, validation rules and in-memory sessions
- **analytics**: per-page aggregates (counts, means, percentiles)
- **assistant**: data context, prompt and the Gemini client
- **downloader**: CSV and XLSX export

### Web Layer (feature `web`)
- **app**: state, templates, routing and middleware
- **pages**: dashboard, domain pages, form posts and downloads
- **graph**: bar, pie, grouped bar, box and scatter charts
- **theme**: background images and shared button styling

## Configuration

See [`config::Config`]; every setting is read from the environment (or a
`.env` file) with a default.
*/

pub mod analytics;
pub mod assistant;
pub mod config;
pub mod database;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod login;
pub mod models;
pub mod records;
pub mod theme;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;
#[cfg(feature = "web")]
pub mod pages;

pub use error::{ArgusError, Result};
