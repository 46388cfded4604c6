/// LSTM cell with batched forward and backward steps.
pub mod lstm_cell;

/// Dropout masks for recurrent inputs.
pub mod dropout;

/// Fully connected layer.
pub mod linear;
