//! List query arguments

use clap::Args;

use crate::client::ListParams;

/// Query arguments for `record list`.
#[derive(Args, Debug, Default, Clone)]
pub struct ListArgs {
    /// Page number (1-indexed)
    #[arg(long, short = 'p')]
    pub page: Option<u32>,

    /// Records per page
    #[arg(long, short = 'n')]
    pub per_page: Option<u32>,

    /// Sort expression, e.g. `-created,name`
    #[arg(long)]
    pub sort: Option<String>,

    /// PocketBase filter expression
    #[arg(long)]
    pub filter: Option<String>,

    /// Relations to expand
    #[arg(long)]
    pub expand: Option<String>,
}

impl ListArgs {
    /// Convert CLI args to API list params.
    pub fn to_params(&self) -> ListParams {
        ListParams {
            page: self.page,
            per_page: self.per_page,
            sort: self.sort.clone(),
            filter: self.filter.clone(),
            expand: self.expand.clone(),
        }
    }
}
