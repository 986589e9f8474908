pub mod texture_spoof_scorer;
