/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

mod cli;
mod commands;
mod config;

use anyhow::{bail, Result};
use inventory_core::telemetry::init_tracing;

use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    if cli.generate_config {
        println!("{}", Config::example_toml());
        return Ok(());
    }

    init_tracing(cli.debug);

    let config = Config::load(cli.config.as_deref())?;
    let Some(command) = cli.command else {
        bail!("no command given, see --help");
    };

    commands::execute(command, &config).await
}
