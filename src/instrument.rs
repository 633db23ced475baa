use serde::{Deserialize, Serialize};

/// Contract attributes attached to every order event.
///
/// The engine carries these through to its outputs untouched; nothing in
/// the matching path reads them. Derivative fields (expiry, strike, option
/// type) stay textual for the same reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub instrument: String,
    pub expiry_date: String,
    pub strike_price: String,
    pub option_type: String,
    pub trigger_price: String,
    pub on_stop_flag: String,
    pub io_flag: String,
    pub spread_comb_type: String,
    pub algo_ind: String,
    pub client_id_flag: String,
}

impl Contract {
    /// Minimal equity contract, e.g. "AXISBANK"/"EQ". Used by generated
    /// order flow.
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            instrument: "EQ".to_string(),
            ..Self::default()
        }
    }
}
