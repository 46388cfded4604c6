/// Stacked LSTM network.
pub mod lstm_network;

/// LSTM encoder with dense forecasting head.
pub mod forecaster;
