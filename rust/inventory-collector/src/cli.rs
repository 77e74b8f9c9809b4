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

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "inventory-collector")]
#[command(about = "ServiceRadar hardware inventory collector")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<String>,

    /// Generate example configuration file
    #[arg(long = "generate-config")]
    pub generate_config: bool,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk a BMC and print the discovery report as JSON
    Discover(EndpointArgs),

    /// Walk a BMC and post its devices directly to the inventory
    Post(EndpointArgs),

    /// Walk a BMC, store the report as a discovery snapshot and reconcile it
    Submit {
        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Snapshot id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Store the snapshot and exit without reconciling it
        #[arg(long)]
        no_wait: bool,
    },

    /// Reconcile one stored snapshot until it reaches a terminal phase
    Reconcile {
        /// Snapshot id
        id: String,
    },

    /// Run the snapshot controller until interrupted
    Run,
}

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// BMC host name, address or URL
    #[arg(short = 'e', long = "endpoint")]
    pub endpoint: String,

    /// Redfish user name (overrides the config file)
    #[arg(short = 'u', long = "username", env = "REDFISH_USERNAME")]
    pub username: Option<String>,

    /// Redfish password (overrides the config file)
    #[arg(
        short = 'p',
        long = "password",
        env = "REDFISH_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
