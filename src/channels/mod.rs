pub mod crud;
