//! Single-stream HTTP GET transfer via libcurl.

use std::io;

use super::{FetchTimeouts, Transfer};
use crate::retry::TransferError;
use crate::storage::PartFile;

/// libcurl-backed transfer: follows redirects, enforces connect/total timeouts,
/// and aborts stalled transfers.
#[derive(Debug, Clone)]
pub struct CurlTransfer {
    pub user_agent: String,
    /// Abort when slower than this many bytes/sec for `low_speed_secs`.
    pub low_speed_limit: u32,
    pub low_speed_secs: u64,
}

impl Default for CurlTransfer {
    fn default() -> Self {
        Self {
            user_agent: concat!("macboot/", env!("CARGO_PKG_VERSION")).to_string(),
            low_speed_limit: 1024,
            low_speed_secs: 60,
        }
    }
}

impl Transfer for CurlTransfer {
    fn transfer(
        &self,
        url: &str,
        part: &mut PartFile,
        timeouts: &FetchTimeouts,
    ) -> Result<(), TransferError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(TransferError::Curl)?;
        easy.follow_location(true).map_err(TransferError::Curl)?;
        easy.max_redirections(10).map_err(TransferError::Curl)?;
        easy.useragent(&self.user_agent).map_err(TransferError::Curl)?;
        easy.connect_timeout(timeouts.connect)
            .map_err(TransferError::Curl)?;
        easy.timeout(timeouts.total).map_err(TransferError::Curl)?;
        easy.low_speed_limit(self.low_speed_limit)
            .map_err(TransferError::Curl)?;
        easy.low_speed_time(std::time::Duration::from_secs(self.low_speed_secs))
            .map_err(TransferError::Curl)?;

        let mut write_error: Option<io::Error> = None;
        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match part.write_chunk(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        write_error = Some(e);
                        Ok(0) // abort transfer
                    }
                })
                .map_err(TransferError::Curl)?;
            transfer.perform()
        };

        if let Some(e) = write_error {
            return Err(TransferError::Storage(e));
        }
        performed.map_err(TransferError::Curl)?;

        // file:// transfers report 0.
        let code = easy.response_code().map_err(TransferError::Curl)?;
        if code != 0 && !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        Ok(())
    }
}
