pub mod deal_scorer;
